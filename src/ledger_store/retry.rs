//! Bounded retry for adapter calls
//!
//! Transient store failures are retried a fixed number of times with linear
//! backoff. Financial operations themselves are never retried here; only the
//! single store call that failed.

use std::future::Future;
use std::time::Duration;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts - 1 => {
                    let delay = self.base_delay * (attempt + 1);
                    tracing::warn!(
                        operation = op_name,
                        error = %e,
                        "Transient store error, retrying (attempt {}/{})",
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(operation = op_name, error = %e, "Store retries exhausted");
                    return Err(StoreError::MaxRetriesExceeded(op_name));
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::MaxRetriesExceeded(op_name))
    }
}
