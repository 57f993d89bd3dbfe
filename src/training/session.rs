//! Training session persistence.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::KoaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown message role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSession {
    pub id: String,
    pub user_id: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<TrainingMessage>,
}

pub struct NewSession<'a> {
    pub user_id: &'a str,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub purpose: &'a str,
}

/// Create an active session and return its id.
pub fn create_session(conn: &Connection, session: &NewSession<'_>) -> Result<String, KoaError> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO training_sessions (id, user_id, is_active, user_agent, ip_address, purpose, created_at, updated_at) \
         VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            session.user_id,
            session.user_agent,
            session.ip_address,
            session.purpose,
            now
        ],
    )?;
    Ok(id)
}

/// The user's most recent active session, if any.
pub fn active_session_id(conn: &Connection, user_id: &str) -> Result<Option<String>, KoaError> {
    let id = conn
        .query_row(
            "SELECT id FROM training_sessions WHERE user_id = ?1 AND is_active = 1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn add_message(
    conn: &Connection,
    session_id: &str,
    role: MessageRole,
    content: &str,
    analysis: Option<&str>,
) -> Result<(), KoaError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO training_messages (session_id, role, content, analysis, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, role.as_str(), content, analysis, now],
    )?;
    conn.execute(
        "UPDATE training_sessions SET updated_at = ?1 WHERE id = ?2",
        params![now, session_id],
    )?;
    Ok(())
}

/// Deactivate every active session of `user_id`. Returns the most recent
/// deactivated session id.
pub fn deactivate_user_sessions(conn: &Connection, user_id: &str) -> Result<Option<String>, KoaError> {
    let latest = active_session_id(conn, user_id)?;
    if latest.is_some() {
        conn.execute(
            "UPDATE training_sessions SET is_active = 0, updated_at = ?1 \
             WHERE user_id = ?2 AND is_active = 1",
            params![Utc::now().to_rfc3339(), user_id],
        )?;
    }
    Ok(latest)
}

/// Deactivate one session by id. Returns `false` if missing or already inactive.
pub fn deactivate_session(conn: &Connection, session_id: &str) -> Result<bool, KoaError> {
    let rows = conn.execute(
        "UPDATE training_sessions SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
        params![Utc::now().to_rfc3339(), session_id],
    )?;
    Ok(rows > 0)
}

fn session_messages(conn: &Connection, session_id: &str) -> Result<Vec<TrainingMessage>, KoaError> {
    let mut stmt = conn.prepare(
        "SELECT role, content, analysis, created_at FROM training_messages \
         WHERE session_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            let role: String = row.get(0)?;
            Ok(TrainingMessage {
                role: role.parse().unwrap_or(MessageRole::User),
                content: row.get(1)?,
                analysis: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active sessions with their messages, newest first.
pub fn list_active_sessions(conn: &Connection) -> Result<Vec<TrainingSession>, KoaError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, is_active, user_agent, ip_address, purpose, created_at, updated_at \
         FROM training_sessions WHERE is_active = 1 ORDER BY created_at DESC, id DESC",
    )?;
    let sessions = stmt
        .query_map([], |row| {
            Ok(TrainingSession {
                id: row.get(0)?,
                user_id: row.get(1)?,
                is_active: row.get(2)?,
                user_agent: row.get(3)?,
                ip_address: row.get(4)?,
                purpose: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
                messages: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    sessions
        .into_iter()
        .map(|mut s| {
            s.messages = session_messages(conn, &s.id)?;
            Ok(s)
        })
        .collect()
}
