pub mod answer;
pub mod posts;
pub mod search;
pub mod seed;
pub mod store;
pub mod types;

pub use search::{search, search_with_limit, ScoredSnippet};
pub use types::{NewSnippet, Snippet, TrainingMetadata, TrainingType, XPost, TRAINING_SECTION};

use crate::db::{self, Db};
use crate::error::KoaError;

/// Async access to snippets and posts over the shared store.
#[derive(Clone)]
pub struct KnowledgeBase {
    db: Db,
}

impl KnowledgeBase {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Rank the active snippets against `query`. An empty query is a caller error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredSnippet>, KoaError> {
        if query.trim().is_empty() {
            return Err(KoaError::InvalidArgument("query must not be empty".into()));
        }
        let snippets = self.active_snippets().await?;
        Ok(search_with_limit(query, &snippets, limit))
    }

    pub async fn active_snippets(&self) -> Result<Vec<Snippet>, KoaError> {
        db::with_conn(&self.db, |conn| store::list_active_snippets(conn)).await
    }

    pub async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<XPost>, KoaError> {
        if query.trim().is_empty() {
            return Err(KoaError::InvalidArgument("query must not be empty".into()));
        }
        let query = query.to_string();
        db::with_conn(&self.db, move |conn| posts::search_posts(conn, &query, limit)).await
    }

    pub async fn training_snippets(&self) -> Result<Vec<Snippet>, KoaError> {
        db::with_conn(&self.db, |conn| store::list_training_snippets(conn)).await
    }

    /// Soft-delete a captured training snippet; `NotFound` if no active one matches.
    pub async fn remove_training_snippet(&self, id: &str) -> Result<(), KoaError> {
        let id = id.to_string();
        db::with_conn(&self.db, move |conn| {
            if store::soft_delete_training_snippet(conn, &id)? {
                tracing::info!(snippet_id = %id, "training snippet removed");
                Ok(())
            } else {
                Err(KoaError::NotFound(format!("training snippet {id}")))
            }
        })
        .await
    }
}
