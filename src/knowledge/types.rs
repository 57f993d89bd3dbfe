//! Knowledge snippet type definitions.
//!
//! A [`Snippet`] is one titled unit of knowledge-base text. Operator-curated
//! snippets come from the built-in seed; user-provided snippets are written by
//! the training capture flow and carry [`TrainingMetadata`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Section label given to snippets captured from training sessions.
pub const TRAINING_SECTION: &str = "User Training Data";

/// Where a snippet's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingType {
    /// Written by the operator seed or admin tooling.
    OperatorCurated,
    /// Captured from a visitor during a secret-code training session.
    UserProvided,
}

impl TrainingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OperatorCurated => "operator_curated",
            Self::UserProvided => "user_provided",
        }
    }
}

impl std::fmt::Display for TrainingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrainingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator_curated" => Ok(Self::OperatorCurated),
            "user_provided" => Ok(Self::UserProvided),
            _ => Err(format!("unknown training type: {s}")),
        }
    }
}

/// Optional provenance attached to a snippet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_type: Option<TrainingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

/// A stored knowledge snippet, matching the `snippets` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// UUID v7 primary key.
    pub id: String,
    pub title: String,
    /// Free text. Never empty.
    pub body: String,
    /// Category label. Never empty.
    pub section: String,
    pub source_url: String,
    /// Position within the seed; captured training sorts last.
    pub sort_order: i64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TrainingMetadata>,
    pub is_active: bool,
    pub created_at: String,
}

impl Snippet {
    pub fn training_type(&self) -> Option<TrainingType> {
        self.metadata.as_ref().and_then(|m| m.training_type)
    }

    pub fn is_user_training(&self) -> bool {
        self.training_type() == Some(TrainingType::UserProvided)
    }

    pub fn intent(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.intent.as_deref())
    }
}

/// Input for creating a snippet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSnippet {
    pub title: String,
    pub body: String,
    pub section: String,
    pub source_url: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub metadata: Option<TrainingMetadata>,
}

/// A social post used as secondary grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPost {
    pub post_id: String,
    pub content: String,
    pub author: String,
    pub posted_at: DateTime<Utc>,
    pub likes: u32,
    pub retweets: u32,
    pub replies: u32,
    pub url: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub is_retweet: bool,
    pub is_reply: bool,
}
