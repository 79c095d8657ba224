//! Bounded exponential-backoff retry for I/O boundaries.
//!
//! The policy is applied only where the pipeline touches external
//! systems (cold-store inserts, hot-store publishes, vendor fetches) and
//! only retries errors whose classification says a retry can help.
//! Validation failures and other permanent errors surface immediately.

use std::time::Duration;

use tracing::warn;

use super::traits::ErrorClassification;

/// Exponential backoff policy: delays double from `initial_delay` up to
/// `max_delay`, for at most `max_attempts` total attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        let max_attempts = max_attempts.max(1);
        let max_delay = max_delay.max(initial_delay);
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Policy for store writes: a few quick attempts.
    pub fn store_default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(5))
    }

    /// Policy for vendor fetches: more attempts, longer window.
    pub fn fetch_default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }

    /// Delay before retry number `attempt` (0-based), doubling and
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        let delay = self.initial_delay.saturating_mul(multiplier);
        std::cmp::min(delay, self.max_delay)
    }

    /// Run `operation`, retrying while the returned error classifies as
    /// transient. Permanent, configuration and internal errors are
    /// returned on the first occurrence.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: ErrorClassification + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;

                    if !err.is_transient() || attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::store_default()
    }
}
