//! Throughput control for slow external services.
//!
//! [`RateLimiter`] caps concurrent calls and holds each slot for a cooldown
//! after the call finishes. [`RetryPolicy`] repeats a failed call with
//! exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

pub struct RateLimiter {
    permits: Arc<Semaphore>,
    delay: Duration,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, delay: Duration) -> RateLimiter {
        RateLimiter {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            delay,
        }
    }

    /// Runs `operation` once a slot is free. Waiters are admitted in FIFO order.
    ///
    /// The slot is released only after the cooldown, whether the operation
    /// succeeded or failed. Dropping the returned future also releases it.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = self.permits.acquire().await.ok();
        let output = operation().await;
        tokio::time::sleep(self.delay).await;
        output
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Bounded exponential backoff: attempt `n` (0-based) is followed by a wait of
/// `base_delay * 2^n` before the next one.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Retries every failure.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Retries only failures `is_retryable` accepts; others are returned at once.
    pub async fn run_if<F, Fut, T, E, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "attempt {} failed ({err}), retrying in {}ms",
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `RetryPolicy::new(max_retries, base_delay).run(operation)`.
pub async fn with_retry<F, Fut, T, E>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    RetryPolicy::new(max_retries, base_delay).run(operation).await
}
