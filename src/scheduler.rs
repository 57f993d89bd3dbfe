//! Periodic knowledge refresh.
//!
//! [`AutoTrainer`] is built by the composition root with an injected
//! [`ReseedJob`]. It checks on start and every `check_interval`; when the last
//! successful run is older than a day it runs the job under [`with_retry`].
//! Only one run is in flight at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::db::{self, Db};
use crate::error::KoaError;
use crate::knowledge::{posts, seed};
use crate::retry::{with_retry, RetryPolicy};

const UP_TO_DATE_HOURS: i64 = 24;
const CRITICAL_HOURS: i64 = 48;

#[async_trait]
pub trait ReseedJob: Send + Sync {
    async fn run(&self) -> Result<seed::ReseedReport, KoaError>;

    /// Time of the last successful run recorded in the store, if any.
    async fn last_success(&self) -> Result<Option<DateTime<Utc>>, KoaError>;
}

/// Reseeds snippets and posts in the local store.
pub struct KnowledgeReseeder {
    db: Db,
}

impl KnowledgeReseeder {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReseedJob for KnowledgeReseeder {
    async fn run(&self) -> Result<seed::ReseedReport, KoaError> {
        db::with_conn(&self.db, |conn| seed::reseed(conn, Utc::now())).await
    }

    async fn last_success(&self) -> Result<Option<DateTime<Utc>>, KoaError> {
        db::with_conn(&self.db, |conn| posts::latest_daily_post_time(conn)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NeverTrained,
    Healthy,
    /// Last run more than a day ago.
    Warning,
    /// Last run more than two days ago.
    Critical,
}

pub fn health_for(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> HealthStatus {
    match last {
        None => HealthStatus::NeverTrained,
        Some(t) if now - t > chrono::Duration::hours(CRITICAL_HOURS) => HealthStatus::Critical,
        Some(t) if now - t > chrono::Duration::hours(UP_TO_DATE_HOURS) => HealthStatus::Warning,
        Some(_) => HealthStatus::Healthy,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    pub is_running: bool,
    pub last_training_time: Option<DateTime<Utc>>,
    pub is_up_to_date: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub health_status: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    Completed { report: seed::ReseedReport },
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct TrainerState {
    last_training: Option<DateTime<Utc>>,
    last_error: Option<String>,
    retry_count: u32,
}

/// Clears the running flag when a run ends, including on early return.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AutoTrainer {
    job: Arc<dyn ReseedJob>,
    retry: RetryPolicy,
    check_interval: Duration,
    running: AtomicBool,
    state: Mutex<TrainerState>,
}

impl AutoTrainer {
    pub fn new(job: Arc<dyn ReseedJob>, retry: RetryPolicy, check_interval: Duration) -> Self {
        Self {
            job,
            retry,
            check_interval,
            running: AtomicBool::new(false),
            state: Mutex::new(TrainerState::default()),
        }
    }

    pub fn from_config(job: Arc<dyn ReseedJob>, config: &SchedulerConfig) -> Self {
        Self::new(
            job,
            RetryPolicy::from(config),
            Duration::from_secs(config.check_interval_mins.max(1) * 60),
        )
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrainerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn status(&self) -> TrainingStatus {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> TrainingStatus {
        let stored = match self.job.last_success().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "could not read last reseed time");
                None
            }
        };

        let state = self.state();
        let last = state.last_training.max(stored);
        TrainingStatus {
            is_running: self.running.load(Ordering::SeqCst),
            last_training_time: last,
            is_up_to_date: last
                .is_some_and(|t| now - t < chrono::Duration::hours(UP_TO_DATE_HOURS)),
            last_error: state.last_error.clone(),
            retry_count: state.retry_count,
            health_status: health_for(last, now),
        }
    }

    /// Run the job if the last success is stale. Returns `None` when nothing ran.
    pub async fn check_and_train(&self) -> Result<Option<RunResult>, KoaError> {
        let status = self.status().await;
        if status.is_up_to_date {
            tracing::debug!("knowledge up to date, skipping reseed");
            return Ok(None);
        }
        tracing::info!(health = ?status.health_status, "knowledge outdated, reseeding");
        self.force().await.map(Some)
    }

    /// Run the job now regardless of staleness.
    pub async fn force(&self) -> Result<RunResult, KoaError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("reseed already in progress, skipping");
            return Ok(RunResult::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let result = with_retry(
            &self.retry,
            |attempt| {
                self.state().retry_count = attempt - 1;
                self.job.run()
            },
            |e: &KoaError| !matches!(e, KoaError::InvalidArgument(_)),
        )
        .await;

        let mut state = self.state();
        match result {
            Ok(report) => {
                state.last_training = Some(Utc::now());
                state.last_error = None;
                state.retry_count = 0;
                tracing::info!(
                    snippets = report.snippets.inserted,
                    daily_posts = report.daily_posts.inserted,
                    "reseed completed"
                );
                Ok(RunResult::Completed { report })
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                tracing::error!(error = %e, attempts = state.retry_count + 1, "reseed failed");
                Err(e)
            }
        }
    }

    /// Check immediately, then every `check_interval`, until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.check_and_train().await {
                    tracing::warn!(error = %e, "scheduled reseed failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    fn report() -> seed::ReseedReport {
        seed::ReseedReport {
            snippets: crate::knowledge::store::ReseedCounts { removed: 0, inserted: 1 },
            official_posts: 0,
            daily_posts: posts::DailyPostCounts { removed: 0, inserted: 3 },
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2,
        }
    }

    /// Fails the first `failures` runs, then succeeds.
    struct FlakyJob {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReseedJob for FlakyJob {
        async fn run(&self) -> Result<seed::ReseedReport, KoaError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(KoaError::StoreUnavailable(format!("boom {n}")))
            } else {
                Ok(report())
            }
        }

        async fn last_success(&self) -> Result<Option<DateTime<Utc>>, KoaError> {
            Ok(None)
        }
    }

    fn trainer(job: Arc<dyn ReseedJob>) -> AutoTrainer {
        AutoTrainer::new(job, fast_retry(), Duration::from_secs(3600))
    }

    #[test]
    fn test_health_thresholds() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(health_for(None, now), HealthStatus::NeverTrained);
        assert_eq!(health_for(Some(now - chrono::Duration::hours(2)), now), HealthStatus::Healthy);
        assert_eq!(health_for(Some(now - chrono::Duration::hours(30)), now), HealthStatus::Warning);
        assert_eq!(health_for(Some(now - chrono::Duration::hours(49)), now), HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_never_trained_then_healthy() {
        let job = Arc::new(FlakyJob { failures: 0, calls: AtomicU32::new(0) });
        let trainer = trainer(job.clone());

        let before = trainer.status().await;
        assert_eq!(before.health_status, HealthStatus::NeverTrained);
        assert!(!before.is_up_to_date);

        let ran = trainer.check_and_train().await.unwrap();
        assert!(matches!(ran, Some(RunResult::Completed { .. })));

        let after = trainer.status().await;
        assert_eq!(after.health_status, HealthStatus::Healthy);
        assert!(after.is_up_to_date);

        // already fresh: no second run
        assert!(trainer.check_and_train().await.unwrap().is_none());
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let job = Arc::new(FlakyJob { failures: 2, calls: AtomicU32::new(0) });
        let trainer = trainer(job.clone());
        assert!(matches!(trainer.force().await.unwrap(), RunResult::Completed { .. }));
        assert_eq!(job.calls.load(Ordering::SeqCst), 3);
        let status = trainer.status().await;
        assert!(status.last_error.is_none());
        assert_eq!(status.retry_count, 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let job = Arc::new(FlakyJob { failures: 10, calls: AtomicU32::new(0) });
        let trainer = trainer(job.clone());
        assert!(trainer.force().await.is_err());
        assert_eq!(job.calls.load(Ordering::SeqCst), 3);

        let status = trainer.status().await;
        assert!(status.last_error.unwrap().contains("boom 2"));
        assert_eq!(status.retry_count, 2);
        assert!(!status.is_running);
        assert_eq!(status.health_status, HealthStatus::NeverTrained);
    }

    struct BlockingJob {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ReseedJob for BlockingJob {
        async fn run(&self) -> Result<seed::ReseedReport, KoaError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(report())
        }

        async fn last_success(&self) -> Result<Option<DateTime<Utc>>, KoaError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_concurrent_run_is_skipped() {
        let job = Arc::new(BlockingJob { started: Notify::new(), release: Notify::new() });
        let trainer = Arc::new(trainer(job.clone()));

        let first = {
            let trainer = trainer.clone();
            tokio::spawn(async move { trainer.force().await })
        };
        job.started.notified().await;

        assert!(trainer.status().await.is_running);
        assert!(matches!(trainer.force().await.unwrap(), RunResult::AlreadyRunning));

        job.release.notify_one();
        assert!(matches!(first.await.unwrap().unwrap(), RunResult::Completed { .. }));
        assert!(!trainer.status().await.is_running);
    }

    #[tokio::test]
    async fn test_reseeder_reports_last_daily_post() {
        let db = crate::db::shared(crate::db::open_memory_database().unwrap());
        let job = KnowledgeReseeder::new(db);
        assert!(job.last_success().await.unwrap().is_none());
        let report = job.run().await.unwrap();
        assert_eq!(report.daily_posts.inserted, 3);
        assert!(job.last_success().await.unwrap().is_some());
    }
}
