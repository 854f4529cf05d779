//! The resilient fetch executor: bounded retries with exponential backoff.
//!
//! Shared data-access contexts occasionally fail with "disposed" or "still initializing"
//! style races when several fetch tasks hit the store at once. Those calls almost always
//! succeed when re-attempted a moment later, so every store call in this crate goes
//! through [`run_with_retry`]. The executor knows nothing about calendar semantics: it
//! only looks at the error classification and the cancellation token.
//!
//! This is the single authoritative retry layer of the crate: nothing above it (batch
//! loops, the window loader) retries again, so the worst case for any store call is
//! exactly `max_attempts` attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// How often and how patiently a failed store call is re-attempted
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt; each further attempt doubles it
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// The backoff delay applied after the given (1-based) failed attempt:
    /// `base_delay * 2^(attempt-1)`, i.e. 500/1000/2000/4000ms with the defaults
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `operation` with at most `policy.max_attempts` attempts.
///
/// Errors that are not [transient](StoreError::is_transient) are re-raised immediately.
/// Transient errors are re-raised once the attempt ceiling is exhausted. \
/// Cancelling the token aborts before the next attempt or during a backoff sleep and
/// yields [`StoreError::Cancelled`]: a cancellation never counts as a failure and is
/// never retried.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, cancel: &CancellationToken,
                                       mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = std::cmp::max(policy.max_attempts, 1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.is_transient() == false || attempt >= max_attempts {
                    return Err(err);
                }

                let delay = policy.delay_for(attempt);
                log::debug!("Transient store failure (attempt {}/{}): {}. Retrying in {:?}",
                            attempt, max_attempts, err, delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                    _ = tokio::time::sleep(delay) => {},
                }
                attempt += 1;
            },
        }
    }
}
