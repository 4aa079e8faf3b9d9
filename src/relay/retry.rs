//! Bounded retry with exponential backoff for durable log calls.

use log::warn;
use std::future::Future;
use std::time::Duration;

use crate::store::LogError;

/// Retry policy owned by the relay.
///
/// A hung or unavailable durable log may stall one room for at most
/// `max_attempts` tries with exponentially growing delays; it never stalls
/// a room indefinitely, and never stalls other rooms at all.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the retry following the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run an idempotent log operation under this policy.
    ///
    /// Only [`LogError::Unavailable`] is retried; a [`LogError::Conflict`]
    /// is a definitive answer and returns immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LogError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(LogError::Conflict) => return Err(LogError::Conflict),
                Err(err @ LogError::Unavailable(_)) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "durable log attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
