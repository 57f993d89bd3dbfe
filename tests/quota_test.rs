mod helpers;

use std::sync::Arc;

use chrono::Duration;
use koa::db;
use koa::error::KoaError;
use koa::quota::{self, QuotaPolicy, QuotaTracker, DAILY_LIMIT};

#[test]
fn counts_rise_by_one_up_to_the_limit() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy::default();

    for expected in 1..=DAILY_LIMIT {
        let status = quota::record_message(&mut conn, "c1", helpers::t0(), &policy).unwrap();
        assert_eq!(status.message_count, expected);
        assert_eq!(status.can_send, expected < DAILY_LIMIT);
    }
}

#[test]
fn call_past_the_limit_fails_without_change() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy::default();
    let now = helpers::t0();
    for _ in 0..DAILY_LIMIT {
        quota::record_message(&mut conn, "c1", now, &policy).unwrap();
    }

    let err = quota::record_message(&mut conn, "c1", now + Duration::minutes(5), &policy)
        .unwrap_err();
    match err {
        KoaError::QuotaExceeded(status) => {
            assert_eq!(status.message_count, DAILY_LIMIT);
            assert!(!status.can_send);
            assert!(status.time_until_reset_ms > 0);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }

    let status = quota::get_status(&conn, "c1", now, &policy).unwrap();
    assert_eq!(status.message_count, DAILY_LIMIT);
}

#[test]
fn window_resets_after_a_day() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy::default();
    let start = helpers::t0();
    for _ in 0..DAILY_LIMIT {
        quota::record_message(&mut conn, "c1", start, &policy).unwrap();
    }

    let later = start + Duration::hours(24);
    let reported = quota::get_status(&conn, "c1", later, &policy).unwrap();
    assert!(reported.can_send);
    assert_eq!(reported.message_count, 0);

    let status = quota::record_message(&mut conn, "c1", later, &policy).unwrap();
    assert_eq!(status.message_count, 1);
    assert_eq!(status.time_until_reset_ms, Duration::hours(24).num_milliseconds());
}

#[test]
fn window_does_not_slide_within_the_day() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy::default();
    let start = helpers::t0();
    quota::record_message(&mut conn, "c1", start, &policy).unwrap();

    let status =
        quota::record_message(&mut conn, "c1", start + Duration::hours(23), &policy).unwrap();
    assert_eq!(status.message_count, 2);
    assert_eq!(status.time_until_reset_ms, Duration::hours(1).num_milliseconds());
}

#[test]
fn status_of_unknown_client_is_new_and_not_persisted() {
    let conn = helpers::test_db();
    let policy = QuotaPolicy::default();
    let status = quota::get_status(&conn, "ghost", helpers::t0(), &policy).unwrap();
    assert!(status.is_new_client);
    assert!(status.can_send);
    assert_eq!(status.message_count, 0);
    assert!(quota::list_active_clients(&conn).unwrap().is_empty());
}

#[test]
fn empty_client_id_is_rejected() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy::default();
    assert!(matches!(
        quota::record_message(&mut conn, "  ", helpers::t0(), &policy),
        Err(KoaError::InvalidArgument(_))
    ));
    assert!(matches!(
        quota::get_status(&conn, "", helpers::t0(), &policy),
        Err(KoaError::InvalidArgument(_))
    ));
}

#[test]
fn statistics_count_lifetime_messages() {
    let mut conn = helpers::test_db();
    let policy = QuotaPolicy {
        daily_limit: 2,
        window: Duration::hours(24),
    };
    let start = helpers::t0();
    quota::record_message(&mut conn, "a", start, &policy).unwrap();
    quota::record_message(&mut conn, "a", start, &policy).unwrap();
    quota::record_message(&mut conn, "a", start + Duration::hours(30), &policy).unwrap();
    quota::record_message(&mut conn, "b", start, &policy).unwrap();

    let clients = quota::list_active_clients(&conn).unwrap();
    let stats = quota::client_statistics(&clients, start + Duration::hours(31), &policy);
    assert_eq!(stats.total_clients, 2);
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.active_today, 1);
    assert_eq!(stats.daily_limit, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_never_exceed_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::open_database(dir.path().join("koa.db")).unwrap();
    let tracker = Arc::new(QuotaTracker::new(db::shared(conn), QuotaPolicy::default()));

    let mut handles = Vec::new();
    for _ in 0..150 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move { tracker.record_message("busy").await }));
    }

    let (mut ok, mut exceeded) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(KoaError::QuotaExceeded(_)) => exceeded += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 100);
    assert_eq!(exceeded, 50);

    let status = tracker.status("busy").await.unwrap();
    assert_eq!(status.message_count, 100);
    assert!(!status.can_send);
}

#[test]
fn separate_connections_share_one_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("koa.db");
    let policy = QuotaPolicy {
        daily_limit: 40,
        window: Duration::hours(24),
    };
    let conns: Vec<_> = (0..6).map(|_| db::open_database(&path).unwrap()).collect();

    let handles: Vec<_> = conns
        .into_iter()
        .map(|mut conn| {
            std::thread::spawn(move || {
                (0..10)
                    .filter(|_| {
                        quota::record_message(&mut conn, "shared", chrono::Utc::now(), &policy)
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();
    let ok: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(ok, 40);

    let conn = db::open_database(&path).unwrap();
    let status = quota::get_status(&conn, "shared", chrono::Utc::now(), &policy).unwrap();
    assert_eq!(status.message_count, 40);
}

#[tokio::test]
async fn unreachable_store_denies_sending() {
    let db = helpers::shared_db();
    let tracker = QuotaTracker::new(db.clone(), QuotaPolicy::default());
    tracker.record_message("c1").await.unwrap();
    helpers::poison(&db);

    assert!(matches!(
        tracker.status("c1").await,
        Err(KoaError::StoreUnavailable(_))
    ));

    let status = tracker.status_or_deny("c1").await.unwrap();
    assert!(!status.can_send);
    assert_eq!(status.message_count, DAILY_LIMIT);
    assert_eq!(status.daily_limit, DAILY_LIMIT);

    let registered = tracker.register_or_deny("c2", None, None).await.unwrap();
    assert!(!registered.can_send);
    assert!(!registered.is_new_client);
}

#[tokio::test]
async fn register_or_deny_passes_through_a_healthy_store() {
    let tracker = QuotaTracker::new(helpers::shared_db(), QuotaPolicy::default());
    let status = tracker
        .register_or_deny("c1", Some("10.0.0.1".into()), None)
        .await
        .unwrap();
    assert!(status.can_send);
    assert!(!status.is_new_client);
    assert_eq!(status.message_count, 0);

    assert!(matches!(
        tracker.register_or_deny(" ", None, None).await,
        Err(KoaError::InvalidArgument(_))
    ));
}
