pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::KoaError;

/// Shared handle to the single SQLite connection.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the Koa database at the given path with schema and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Wrap a connection for sharing across request handlers.
pub fn shared(conn: Connection) -> Db {
    Arc::new(Mutex::new(conn))
}

/// Lock the shared connection, mapping a poisoned lock to `StoreUnavailable`.
pub fn lock(db: &Db) -> Result<MutexGuard<'_, Connection>, KoaError> {
    db.lock()
        .map_err(|e| KoaError::StoreUnavailable(format!("db lock poisoned: {e}")))
}

/// Run a synchronous store operation on the blocking pool.
pub async fn with_conn<T, F>(db: &Db, f: F) -> Result<T, KoaError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, KoaError> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let mut conn = lock(&db)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| KoaError::StoreUnavailable(format!("db task failed: {e}")))?
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub client_count: u64,
    pub active_snippet_count: u64,
    pub post_count: u64,
}

pub fn check_database_health(conn: &Connection) -> rusqlite::Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    let count = |sql: &str| -> rusqlite::Result<u64> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    };

    Ok(HealthReport {
        schema_version: migrations::get_schema_version(conn)?,
        integrity_ok: integrity == "ok",
        client_count: count("SELECT COUNT(*) FROM clients")?,
        active_snippet_count: count("SELECT COUNT(*) FROM snippets WHERE is_active = 1")?,
        post_count: count("SELECT COUNT(*) FROM x_posts")?,
    })
}
