//! SQL DDL for all Koa tables.
//!
//! Defines the `clients`, `snippets`, `training_sessions`, `training_messages`,
//! `x_posts`, and `schema_meta` tables. All DDL uses `IF NOT EXISTS` for
//! idempotent initialization.

use rusqlite::Connection;

/// Schema version 1. Later columns are added by [`super::migrations`].
const SCHEMA_SQL: &str = r#"
-- Per-browser quota records
CREATE TABLE IF NOT EXISTS clients (
    client_id TEXT PRIMARY KEY,
    message_count INTEGER NOT NULL DEFAULT 0 CHECK(message_count >= 0),
    window_start INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clients_window ON clients(window_start);

-- Knowledge base used for prompt grounding
CREATE TABLE IF NOT EXISTS snippets (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL CHECK(length(body) > 0),
    section TEXT NOT NULL CHECK(length(section) > 0),
    source_url TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0,
    keywords TEXT,
    metadata TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snippets_active ON snippets(is_active, sort_order);
CREATE INDEX IF NOT EXISTS idx_snippets_section ON snippets(section);

-- Secret-code training capture
CREATE TABLE IF NOT EXISTS training_sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    user_agent TEXT,
    ip_address TEXT,
    purpose TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_training_sessions_user ON training_sessions(user_id, is_active);

CREATE TABLE IF NOT EXISTS training_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES training_sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content TEXT NOT NULL,
    analysis TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_training_messages_session ON training_messages(session_id);

-- Social posts used as secondary grounding
CREATE TABLE IF NOT EXISTS x_posts (
    post_id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    author TEXT NOT NULL DEFAULT 'koasync',
    posted_at TEXT NOT NULL,
    likes INTEGER NOT NULL DEFAULT 0,
    retweets INTEGER NOT NULL DEFAULT 0,
    replies INTEGER NOT NULL DEFAULT 0,
    url TEXT NOT NULL,
    hashtags TEXT NOT NULL DEFAULT '[]',
    mentions TEXT NOT NULL DEFAULT '[]',
    is_retweet INTEGER NOT NULL DEFAULT 0,
    is_reply INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_x_posts_posted ON x_posts(posted_at);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
