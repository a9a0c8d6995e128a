//! Retry logic with jittered exponential backoff
//!
//! Used for seed registration and for bounded write retries to peers.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for network operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom parameters
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Short policy for peer writes: a slow peer must not hold up a broadcast for long
    pub fn peer_write() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(200),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if should_retry(&e) && attempt < self.max_attempts => {
                    warn!(
                        "Operation failed on attempt {}: {}. Retrying in {:?}...",
                        attempt, e, delay
                    );

                    // Add jitter to prevent thundering herd
                    let jitter = delay.as_millis() as f64 * 0.1 * (rand::random::<f64>() - 0.5);
                    let actual_delay = delay + Duration::from_millis(jitter.abs() as u64);
                    tokio::time::sleep(actual_delay).await;

                    delay = std::cmp::min(delay * 2, self.max_delay);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt == self.max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, e);
                    } else {
                        debug!("Non-retryable error: {}", e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Determine if an error should trigger a retry
pub fn should_retry(error: &Error) -> bool {
    error.is_retryable()
}
