//! Retry with exponential backoff for fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
        }
    }
}

impl From<&SchedulerConfig> for RetryPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            initial_delay: Duration::from_secs(config.initial_retry_delay_secs),
            backoff_factor: config.backoff_factor,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based). The first attempt has none.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_factor.max(1).saturating_pow(attempt - 2);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, `retry_if` rejects the error, or the policy's
/// attempts are used up. `op` receives the 1-based attempt number. The last
/// error is returned on failure.
pub async fn with_retry<T, E, F, Fut, R>(policy: &RetryPolicy, mut op: F, retry_if: R) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && retry_if(&e) => {
                let delay = policy.delay_before(attempt + 1);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::error!(attempt, error = %e, "operation failed after retries");
                }
                return Err(e);
            }
        }
    }
}
