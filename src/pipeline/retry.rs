//! Uniform retry policy with exponential backoff.
//!
//! One policy object drives every stage; components never loop on their
//! own. Quota errors back off on a longer schedule than generic
//! transient failures, and permanent/validation errors return
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{ErrorClass, StageError};

/// Retry/backoff schedule applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first try)
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,

    /// Cap on any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Delay multiplier after each retry
    pub backoff_multiplier: f64,

    /// Extra multiplier applied to quota-class failures
    pub quota_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            quota_multiplier: config.quota_multiplier,
        }
    }

    /// Policy with an overridden attempt ceiling (operator `--max-retries`).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the retry following the given attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, class: ErrorClass) -> Duration {
        let base = if attempt <= 1 {
            self.initial_delay_ms as f64
        } else {
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32)
        };

        let scaled = match class {
            ErrorClass::Quota => base * self.quota_multiplier,
            _ => base,
        };

        Duration::from_millis(scaled.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32, error: &StageError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

/// Run `op` under the policy. Retries retryable failures with backoff up
/// to the attempt ceiling; returns the last error once exhausted, and
/// returns permanent failures without retrying.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    stage: &str,
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.should_retry(attempt, &e) => {
                let delay = policy.delay_for_attempt(attempt, e.class());
                warn!(
                    stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Stage failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
