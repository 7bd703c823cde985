//! Bounded retry with a fixed fallback delay
//!
//! The failing operation may name its own delay through
//! [`Retryable::retry_delay`]; otherwise the policy delay applies. No sleep
//! follows the final attempt.

use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait before a retry when the error carries no delay of its own
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }
}

/// Errors that can be retried
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Delay requested by the failing party; takes precedence over the policy
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `f` until it succeeds, fails for good or runs out of attempts.
    /// `f` receives the 1-indexed attempt number.
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            debug!("Attempt {} of {}", attempt, self.policy.max_attempts);

            let error = match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!("Not retrying: {}", error);
                return Err(RetryError::NonRetryableError(error));
            }
            if attempt >= self.policy.max_attempts {
                warn!("Giving up after {} attempts: {}", attempt, error);
                return Err(RetryError::MaxAttemptsExceeded {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = error.retry_delay().unwrap_or(self.policy.delay);
            debug!("Attempt {} failed: {}. Retrying in {:?}", attempt, error, delay);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts, last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    #[error("non-retryable error: {0}")]
    NonRetryableError(E),
}
