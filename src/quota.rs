//! Per-client rolling daily message quota.
//!
//! A client is an opaque per-browser identifier. Each accepted message
//! (user turn or assistant reply) consumes one unit; once `daily_limit` units
//! are used inside the current window, [`record_message`] fails with
//! [`KoaError::QuotaExceeded`] until the window has elapsed.
//!
//! The limit check and the increment are a single conditional `UPDATE`, so two
//! concurrent increments for the same client can never both pass the limit.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::db::{self, Db};
use crate::error::KoaError;

/// Fixed daily allowance per client.
pub const DAILY_LIMIT: u32 = 100;

/// Snapshot of a client's quota as reported to the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    pub can_send: bool,
    pub message_count: u32,
    pub daily_limit: u32,
    pub time_until_reset_ms: i64,
    pub is_new_client: bool,
}

impl ClientStatus {
    /// Status reported when the store cannot be consulted: sending is denied.
    pub fn denied(daily_limit: u32) -> Self {
        Self {
            can_send: false,
            message_count: daily_limit,
            daily_limit,
            time_until_reset_ms: 0,
            is_new_client: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub daily_limit: u32,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_limit: DAILY_LIMIT,
            window: Duration::hours(24),
        }
    }
}

impl QuotaPolicy {
    fn window_ms(&self) -> i64 {
        self.window.num_milliseconds()
    }

    fn status_for(&self, message_count: u32, window_start_ms: i64, now: DateTime<Utc>) -> ClientStatus {
        let elapsed = now.timestamp_millis() - window_start_ms;
        if elapsed >= self.window_ms() {
            return ClientStatus {
                can_send: true,
                message_count: 0,
                daily_limit: self.daily_limit,
                time_until_reset_ms: 0,
                is_new_client: false,
            };
        }
        ClientStatus {
            can_send: message_count < self.daily_limit,
            message_count,
            daily_limit: self.daily_limit,
            time_until_reset_ms: self.window_ms() - elapsed,
            is_new_client: false,
        }
    }
}

fn validate_client_id(client_id: &str) -> Result<(), KoaError> {
    if client_id.trim().is_empty() {
        return Err(KoaError::InvalidArgument("Client ID is required".into()));
    }
    Ok(())
}

/// Read `(message_count, window_start_ms)` for a client, if a record exists.
fn load_window(conn: &Connection, client_id: &str) -> rusqlite::Result<Option<(u32, i64)>> {
    conn.query_row(
        "SELECT message_count, window_start FROM clients WHERE client_id = ?1",
        params![client_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Pure status check. Never creates a record; an elapsed window is reported
/// as reset without persisting the reset.
pub fn get_status(
    conn: &Connection,
    client_id: &str,
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> Result<ClientStatus, KoaError> {
    validate_client_id(client_id)?;

    match load_window(conn, client_id)? {
        None => Ok(ClientStatus {
            can_send: true,
            message_count: 0,
            daily_limit: policy.daily_limit,
            time_until_reset_ms: 0,
            is_new_client: true,
        }),
        Some((count, window_start)) => Ok(policy.status_for(count, window_start, now)),
    }
}

/// Create the client record if missing (`message_count = 0`, window starting
/// now). Returns `true` when a record was created.
pub fn register_client(
    conn: &Connection,
    client_id: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, KoaError> {
    validate_client_id(client_id)?;
    let ts = now.to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO clients \
         (client_id, message_count, window_start, ip_address, user_agent, is_active, created_at, updated_at) \
         VALUES (?1, 0, ?2, ?3, ?4, 1, ?5, ?5)",
        params![client_id, now.timestamp_millis(), ip_address, user_agent, ts],
    )?;
    if inserted > 0 {
        tracing::info!(client_id, "registered new client");
    }
    Ok(inserted > 0)
}

/// Charge one message against the client's quota.
///
/// Resets the window (count = 1, window start = `now`) when it has elapsed,
/// otherwise increments. Fails with `QuotaExceeded` without touching the
/// record when the client is at its limit.
pub fn record_message(
    conn: &mut Connection,
    client_id: &str,
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> Result<ClientStatus, KoaError> {
    validate_client_id(client_id)?;
    let now_ms = now.timestamp_millis();
    let ts = now.to_rfc3339();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT OR IGNORE INTO clients \
         (client_id, message_count, window_start, is_active, created_at, updated_at) \
         VALUES (?1, 0, ?2, 1, ?3, ?3)",
        params![client_id, now_ms, ts],
    )?;

    // SET expressions all see the pre-update row.
    let updated = tx.execute(
        "UPDATE clients SET \
           message_count = CASE WHEN ?2 - window_start >= ?3 THEN 1 ELSE message_count + 1 END, \
           window_start = CASE WHEN ?2 - window_start >= ?3 THEN ?2 ELSE window_start END, \
           total_messages = total_messages + 1, \
           updated_at = ?5 \
         WHERE client_id = ?1 AND (?2 - window_start >= ?3 OR message_count < ?4)",
        params![client_id, now_ms, policy.window_ms(), policy.daily_limit, ts],
    )?;

    let (count, window_start) = load_window(&tx, client_id)?.ok_or_else(|| {
        KoaError::StoreUnavailable(format!("client record vanished: {client_id}"))
    })?;
    tx.commit()?;

    let status = policy.status_for(count, window_start, now);
    if updated == 0 {
        tracing::info!(client_id, message_count = count, "daily quota exhausted");
        return Err(KoaError::QuotaExceeded(status));
    }

    tracing::debug!(client_id, message_count = count, "message recorded");
    Ok(status)
}

/// Soft-deactivate a client. Returns `false` when no active record matched.
pub fn deactivate_client(conn: &Connection, client_id: &str) -> Result<bool, KoaError> {
    validate_client_id(client_id)?;
    let rows = conn.execute(
        "UPDATE clients SET is_active = 0, updated_at = ?1 WHERE client_id = ?2 AND is_active = 1",
        params![Utc::now().to_rfc3339(), client_id],
    )?;
    Ok(rows > 0)
}

/// A client row as shown on the admin listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub client_id: String,
    pub message_count: u32,
    pub total_messages: u64,
    pub window_start: DateTime<Utc>,
    pub last_active: String,
    pub created_at: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatistics {
    pub total_clients: u64,
    pub total_messages: u64,
    pub active_today: u64,
    pub daily_limit: u32,
}

/// All active clients, most recently active first.
pub fn list_active_clients(conn: &Connection) -> Result<Vec<ClientRecord>, KoaError> {
    let mut stmt = conn.prepare(
        "SELECT client_id, message_count, total_messages, window_start, updated_at, created_at, is_active \
         FROM clients WHERE is_active = 1 ORDER BY updated_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let window_start_ms: i64 = row.get(3)?;
            Ok(ClientRecord {
                client_id: row.get(0)?,
                message_count: row.get(1)?,
                total_messages: row.get::<_, i64>(2)? as u64,
                window_start: DateTime::from_timestamp_millis(window_start_ms).unwrap_or_default(),
                last_active: row.get(4)?,
                created_at: row.get(5)?,
                is_active: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Aggregate statistics over the given client rows.
pub fn client_statistics(
    clients: &[ClientRecord],
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> ClientStatistics {
    ClientStatistics {
        total_clients: clients.len() as u64,
        total_messages: clients.iter().map(|c| c.total_messages).sum(),
        active_today: clients
            .iter()
            .filter(|c| now - c.window_start < policy.window)
            .count() as u64,
        daily_limit: policy.daily_limit,
    }
}

/// Async quota gate over the shared store.
#[derive(Clone)]
pub struct QuotaTracker {
    db: Db,
    policy: QuotaPolicy,
}

impl QuotaTracker {
    pub fn new(db: Db, policy: QuotaPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub async fn status(&self, client_id: &str) -> Result<ClientStatus, KoaError> {
        self.status_at(client_id, Utc::now()).await
    }

    pub async fn status_at(&self, client_id: &str, now: DateTime<Utc>) -> Result<ClientStatus, KoaError> {
        let client_id = client_id.to_string();
        let policy = self.policy;
        db::with_conn(&self.db, move |conn| get_status(conn, &client_id, now, &policy)).await
    }

    /// Status check that denies sending when the store is unreachable.
    pub async fn status_or_deny(&self, client_id: &str) -> Result<ClientStatus, KoaError> {
        let result = self.status(client_id).await;
        self.deny_when_unavailable(client_id, result)
    }

    /// Lazily create the client record, then report its status.
    pub async fn register(
        &self,
        client_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<ClientStatus, KoaError> {
        let client_id = client_id.to_string();
        let policy = self.policy;
        db::with_conn(&self.db, move |conn| {
            let now = Utc::now();
            register_client(conn, &client_id, ip_address.as_deref(), user_agent.as_deref(), now)?;
            get_status(conn, &client_id, now, &policy)
        })
        .await
    }

    /// [`register`](Self::register), denying sending when the store is unreachable.
    pub async fn register_or_deny(
        &self,
        client_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<ClientStatus, KoaError> {
        let result = self.register(client_id, ip_address, user_agent).await;
        self.deny_when_unavailable(client_id, result)
    }

    fn deny_when_unavailable(
        &self,
        client_id: &str,
        result: Result<ClientStatus, KoaError>,
    ) -> Result<ClientStatus, KoaError> {
        match result {
            Err(KoaError::StoreUnavailable(e)) => {
                tracing::warn!(client_id, error = %e, "quota store unavailable, denying");
                Ok(ClientStatus::denied(self.policy.daily_limit))
            }
            other => other,
        }
    }

    pub async fn record_message(&self, client_id: &str) -> Result<ClientStatus, KoaError> {
        self.record_message_at(client_id, Utc::now()).await
    }

    pub async fn record_message_at(
        &self,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClientStatus, KoaError> {
        let client_id = client_id.to_string();
        let policy = self.policy;
        db::with_conn(&self.db, move |conn| record_message(conn, &client_id, now, &policy)).await
    }
}
