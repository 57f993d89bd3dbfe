#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use koa::db::{self, Db};
use koa::knowledge::store::insert_snippet;
use koa::knowledge::{NewSnippet, TrainingMetadata, TrainingType, TRAINING_SECTION};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Fresh in-memory database behind the shared handle used by the services.
pub fn shared_db() -> Db {
    db::shared(test_db())
}

/// Fixed reference instant so window arithmetic is reproducible.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Insert an operator snippet. Returns its id.
pub fn insert_official(conn: &Connection, title: &str, body: &str, order: i64) -> String {
    insert_snippet(
        conn,
        &NewSnippet {
            title: title.into(),
            body: body.into(),
            section: "Introduction".into(),
            source_url: "https://koasync.gitbook.io/koasync".into(),
            sort_order: order,
            ..Default::default()
        },
    )
    .unwrap()
}

/// Insert a captured training snippet. Returns its id.
pub fn insert_training(conn: &Connection, body: &str, intent: &str) -> String {
    insert_snippet(
        conn,
        &NewSnippet {
            title: "General Training - User Training".into(),
            body: body.into(),
            section: TRAINING_SECTION.into(),
            source_url: "https://koasync.gitbook.io/".into(),
            sort_order: 999,
            keywords: vec!["general".into()],
            metadata: Some(TrainingMetadata {
                training_type: Some(TrainingType::UserProvided),
                intent: Some(intent.into()),
                ..Default::default()
            }),
        },
    )
    .unwrap()
}

/// Poison the shared connection's lock so every later store call fails.
pub fn poison(shared: &Db) {
    let handle = shared.clone();
    let _ = std::thread::spawn(move || {
        let _guard = handle.lock().unwrap();
        panic!("poisoning the store lock");
    })
    .join();
    assert!(db::lock(shared).is_err());
}
