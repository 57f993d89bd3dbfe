//! Snippet persistence: insert, list, soft delete, and seed replacement.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::types::{NewSnippet, Snippet, TrainingMetadata, TRAINING_SECTION};
use crate::error::KoaError;

const SNIPPET_COLUMNS: &str =
    "id, title, body, section, source_url, sort_order, keywords, metadata, is_active, created_at";

/// Matches every row that did not come from training capture.
const OPERATOR_FILTER: &str =
    "(metadata IS NULL OR json_extract(metadata, '$.trainingType') IS NOT 'user_provided')";

fn parse_metadata(id: &str, raw: Option<String>) -> Option<TrainingMetadata> {
    let raw = raw?;
    match serde_json::from_str::<TrainingMetadata>(&raw) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(snippet_id = id, error = %e, "ignoring unparseable snippet metadata");
            None
        }
    }
}

fn row_to_snippet(row: &Row<'_>) -> rusqlite::Result<Snippet> {
    let id: String = row.get(0)?;
    let keywords: Option<String> = row.get(6)?;
    let metadata = parse_metadata(&id, row.get(7)?);
    Ok(Snippet {
        id,
        title: row.get(1)?,
        body: row.get(2)?,
        section: row.get(3)?,
        source_url: row.get(4)?,
        sort_order: row.get(5)?,
        keywords: keywords
            .and_then(|k| serde_json::from_str(&k).ok())
            .unwrap_or_default(),
        metadata,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn validate(snippet: &NewSnippet) -> Result<(), KoaError> {
    if snippet.body.trim().is_empty() {
        return Err(KoaError::InvalidArgument("snippet body must not be empty".into()));
    }
    if snippet.section.trim().is_empty() {
        return Err(KoaError::InvalidArgument("snippet section must not be empty".into()));
    }
    Ok(())
}

/// Insert a new active snippet. Returns its id.
pub fn insert_snippet(conn: &Connection, snippet: &NewSnippet) -> Result<String, KoaError> {
    validate(snippet)?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    let keywords = serde_json::to_string(&snippet.keywords)?;
    let metadata = snippet
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO snippets (id, title, body, section, source_url, sort_order, keywords, metadata, is_active, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
        params![
            id,
            snippet.title,
            snippet.body,
            snippet.section,
            snippet.source_url,
            snippet.sort_order,
            keywords,
            metadata,
            now,
        ],
    )?;
    Ok(id)
}

/// Active snippets in collection order (seed order, then insertion order).
pub fn list_active_snippets(conn: &Connection) -> Result<Vec<Snippet>, KoaError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE is_active = 1 ORDER BY sort_order, created_at, id"
    ))?;
    let rows = stmt
        .query_map([], row_to_snippet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active snippets captured from training sessions, newest first.
pub fn list_training_snippets(conn: &Connection) -> Result<Vec<Snippet>, KoaError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE is_active = 1 AND section = ?1 \
         ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map(params![TRAINING_SECTION], row_to_snippet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_active_snippets(conn: &Connection) -> Result<u64, KoaError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM snippets WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Mark a snippet inactive. Returns `false` if it was missing or already inactive.
pub fn soft_delete_snippet(conn: &Connection, id: &str) -> Result<bool, KoaError> {
    let rows = conn.execute(
        "UPDATE snippets SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
        params![Utc::now().to_rfc3339(), id],
    )?;
    Ok(rows > 0)
}

/// Like [`soft_delete_snippet`] but only matches captured training snippets.
pub fn soft_delete_training_snippet(conn: &Connection, id: &str) -> Result<bool, KoaError> {
    let rows = conn.execute(
        "UPDATE snippets SET is_active = 0, updated_at = ?1 \
         WHERE id = ?2 AND is_active = 1 AND section = ?3",
        params![Utc::now().to_rfc3339(), id, TRAINING_SECTION],
    )?;
    Ok(rows > 0)
}

/// Result of replacing the operator-curated set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReseedCounts {
    pub removed: usize,
    pub inserted: usize,
}

/// Replace all operator-curated snippets with `seed`. User training snippets
/// are left untouched. Runs in one transaction.
pub fn replace_operator_snippets(
    conn: &mut Connection,
    seed: &[NewSnippet],
) -> Result<ReseedCounts, KoaError> {
    for snippet in seed {
        validate(snippet)?;
    }

    let tx = conn.transaction()?;
    let removed = tx.execute(&format!("DELETE FROM snippets WHERE {OPERATOR_FILTER}"), [])?;
    for snippet in seed {
        insert_snippet(&tx, snippet)?;
    }
    tx.commit()?;

    tracing::info!(removed, inserted = seed.len(), "operator knowledge replaced");
    Ok(ReseedCounts {
        removed,
        inserted: seed.len(),
    })
}
