//! Bounded retry with a fixed delay between attempts.
//!
//! Every network-facing collaborator call goes through a [`RetryPolicy`].
//! Local-only git operations (init, commit, branch, add, remove) and manifest
//! writes are never retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempts made by the default policy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Delay between attempts made by the default policy.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that makes a single attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Retries `f` on every error until it succeeds or attempts run out.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_if(operation, |_: &E| true, f).await
    }

    /// Retries `f` while `is_retryable` accepts the error.
    ///
    /// A rejected error is returned immediately without sleeping. The last
    /// error is returned once attempts are exhausted.
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut is_retryable: P,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) {
                        tracing::debug!(operation, attempt, error = %err, "error is not retryable");
                        return Err(err);
                    }
                    if attempt >= self.max_attempts {
                        tracing::debug!(
                            operation,
                            attempts = attempt,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(err);
                    }

                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "attempt failed, retrying in {:?}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}
