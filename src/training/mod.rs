//! Secret-code training capture.
//!
//! A visitor who sends the configured secret code opens a training session.
//! While the session is active every message is recorded with a heuristic
//! analysis and stored as a `user_provided` snippet so later searches can
//! surface it. The exit code closes the session. Either code left unset
//! disables that transition.

pub mod analysis;
pub mod session;

use chrono::Utc;
use serde::Serialize;

use crate::config::TrainingConfig;
use crate::db::{self, Db};
use crate::error::KoaError;
use crate::knowledge::seed::GITBOOK_URL;
use crate::knowledge::store::insert_snippet;
use crate::knowledge::types::{NewSnippet, TrainingMetadata, TrainingType, TRAINING_SECTION};
use analysis::MessageAnalysis;
use session::{MessageRole, NewSession};

/// Sort position given to captured snippets so they list after the seed.
const TRAINING_SORT_ORDER: i64 = 999;

pub const ACTIVATED_REPLY: &str =
    "Training session activated! I am now recording all messages for future analysis.";
pub const DEACTIVATED_REPLY: &str =
    "Training mode deactivated! Messages are no longer being recorded.";
pub const NO_SESSION_REPLY: &str = "No active training session found.";

/// A message offered to training capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub user_id: String,
    pub message: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainingOutcome {
    /// The secret code opened a new session.
    Activated { session_id: String },
    /// The exit code was sent. `session_id` is `None` when nothing was active.
    Deactivated { session_id: Option<String> },
    /// The message was captured into the active session.
    Recorded {
        session_id: String,
        snippet_id: String,
        analysis: MessageAnalysis,
        reply: String,
    },
    /// No code and no active session: the message is ordinary chat.
    NotHandled,
}

impl TrainingOutcome {
    /// Reply text for the visitor, if capture handled the message.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Activated { .. } => Some(ACTIVATED_REPLY),
            Self::Deactivated { session_id: Some(_) } => Some(DEACTIVATED_REPLY),
            Self::Deactivated { session_id: None } => Some(NO_SESSION_REPLY),
            Self::Recorded { reply, .. } => Some(reply.as_str()),
            Self::NotHandled => None,
        }
    }

    /// Whether messages from this user are being recorded after this step.
    pub fn training_mode(&self) -> bool {
        matches!(self, Self::Activated { .. } | Self::Recorded { .. })
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Activated { session_id } | Self::Recorded { session_id, .. } => {
                Some(session_id.as_str())
            }
            Self::Deactivated { session_id } => session_id.as_deref(),
            Self::NotHandled => None,
        }
    }
}

fn matches_code(message: &str, code: Option<&str>) -> bool {
    match code.map(str::trim) {
        Some(code) if !code.is_empty() => message.trim() == code,
        _ => false,
    }
}

/// Run capture for one message against an open connection.
pub fn process(
    conn: &mut rusqlite::Connection,
    config: &TrainingConfig,
    request: &CaptureRequest,
) -> Result<TrainingOutcome, KoaError> {
    if request.user_id.trim().is_empty() {
        return Err(KoaError::InvalidArgument("userId must not be empty".into()));
    }
    if request.message.trim().is_empty() {
        return Err(KoaError::InvalidArgument("message must not be empty".into()));
    }

    if matches_code(&request.message, config.exit_code.as_deref()) {
        let session_id = session::deactivate_user_sessions(conn, &request.user_id)?;
        tracing::info!(user_id = %request.user_id, ?session_id, "training session closed");
        return Ok(TrainingOutcome::Deactivated { session_id });
    }

    if matches_code(&request.message, config.secret_code.as_deref()) {
        let tx = conn.transaction()?;
        let session_id = session::create_session(
            &tx,
            &NewSession {
                user_id: &request.user_id,
                user_agent: request.user_agent.as_deref(),
                ip_address: request.ip_address.as_deref(),
                purpose: "Secret training session initiated",
            },
        )?;
        session::add_message(
            &tx,
            &session_id,
            MessageRole::User,
            &request.message,
            Some("Secret training code activated - starting new training session"),
        )?;
        tx.commit()?;
        tracing::info!(user_id = %request.user_id, session_id = %session_id, "training session opened");
        return Ok(TrainingOutcome::Activated { session_id });
    }

    let Some(session_id) = session::active_session_id(conn, &request.user_id)? else {
        return Ok(TrainingOutcome::NotHandled);
    };

    let analysis = analysis::analyze(&request.message);
    let analysis_json = serde_json::to_string_pretty(&analysis)?;

    let tx = conn.transaction()?;
    session::add_message(&tx, &session_id, MessageRole::User, &request.message, None)?;
    session::add_message(
        &tx,
        &session_id,
        MessageRole::Assistant,
        &format!("AI Analysis: {analysis_json}"),
        Some(&analysis_json),
    )?;
    let snippet_id = insert_snippet(&tx, &training_snippet(&request.message, &analysis, &session_id))?;
    tx.commit()?;

    tracing::info!(
        session_id = %session_id,
        snippet_id = %snippet_id,
        intent = analysis.intent.as_str(),
        "training message captured"
    );
    Ok(TrainingOutcome::Recorded {
        session_id,
        snippet_id,
        reply: analysis::natural_response(&request.message).to_string(),
        analysis,
    })
}

fn training_snippet(message: &str, analysis: &MessageAnalysis, session_id: &str) -> NewSnippet {
    NewSnippet {
        title: format!("{} - User Training", analysis::main_topic(message)),
        body: message.to_string(),
        section: TRAINING_SECTION.to_string(),
        source_url: GITBOOK_URL.to_string(),
        sort_order: TRAINING_SORT_ORDER,
        keywords: analysis::training_keywords(message, analysis),
        metadata: Some(TrainingMetadata {
            training_type: Some(TrainingType::UserProvided),
            intent: Some(analysis.intent.as_str().to_string()),
            complexity: Some(analysis.complexity.as_str().to_string()),
            session_id: Some(session_id.to_string()),
            captured_at: Some(Utc::now()),
        }),
    }
}

/// Async front for [`process`] over the shared store.
#[derive(Clone)]
pub struct TrainingCapture {
    db: Db,
    config: TrainingConfig,
}

impl TrainingCapture {
    pub fn new(db: Db, config: TrainingConfig) -> Self {
        Self { db, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.secret_code.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    pub async fn process(&self, request: CaptureRequest) -> Result<TrainingOutcome, KoaError> {
        let config = self.config.clone();
        db::with_conn(&self.db, move |conn| process(conn, &config, &request)).await
    }
}
