//! Exponential back-off shared by every source.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Back-off parameters for a fallible async operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Worst-case wall time of one retried operation whose attempts are each
    /// bounded by `per_attempt`: every attempt plus every back-off sleep.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let sleeps: Duration = (1..attempts).map(|attempt| self.delay_for(attempt)).sum();
        per_attempt * attempts + sleeps
    }

    /// Run `operation` until it succeeds or attempts are exhausted.
    ///
    /// Every failed attempt except the last logs a warning; the last error is
    /// returned to the caller unchanged.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retry_notify(label, operation, |_, _, _| {}).await
    }

    /// Same as [`RetryPolicy::retry`], calling `notify(err, attempt, delay)`
    /// before each back-off sleep.
    pub async fn retry_notify<T, E, F, Fut, N>(
        &self,
        label: &str,
        mut operation: F,
        mut notify: N,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        N: FnMut(&E, u32, Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "🔁 {} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, max_attempts, delay, err
                    );
                    notify(&err, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
