//! Retry policy, timeouts, and the process-wide concurrency pool

use crate::error::{DelveError, DelveResult, ErrorContext};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Backoff policy for calls to external services
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first; 1 disables retries
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Spread delays by up to 10% either way
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// A server hint lengthens the wait but never past `max_delay_ms`.
    pub fn delay_for(&self, retry: usize, hint_ms: Option<u64>) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let cap = self.max_delay_ms as f64;
        let backoff = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent)).min(cap);
        let hint = (hint_ms.unwrap_or(0) as f64).min(cap);
        let mut delay_ms = backoff.max(hint);

        if self.jitter {
            delay_ms *= 1.0 + (fastrand::f64() - 0.5) * 0.2;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// Run `operation` until it succeeds, fails unrecoverably, or the policy
/// runs out of attempts. The last error is returned unchanged.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DelveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DelveResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !err.is_recoverable() {
            if max_attempts > 1 {
                error!(operation = operation_name, attempt, error = %err, "Giving up");
            }
            return Err(err);
        }

        let delay = config.delay_for(attempt, err.retry_delay_ms());
        warn!(
            operation = operation_name,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "Retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Fail with [`DelveError::Timeout`] if `future` outlives `timeout_ms`
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: Future<Output = T>,
{
    timeout(Duration::from_millis(timeout_ms), future)
        .await
        .map_err(|_| DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation(operation_name)
                .with_detail("timeout_ms", timeout_ms),
        })
}

/// Counting semaphore shared by every branch of a research tree.
///
/// Cloning is cheap and every clone draws from the same permits, so one pool
/// constructed at the composition root bounds the whole process.
#[derive(Debug, Clone)]
pub struct ConcurrencyPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot
    pub async fn acquire(&self) -> DelveResult<PoolGuard> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DelveError::Internal {
                message: format!("Failed to acquire concurrency permit: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("concurrency_pool").with_operation("acquire"),
            })?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(PoolGuard {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of guards currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// RAII guard for a pool slot
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 300,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.delay_for(1, None), Duration::from_millis(100));
        assert_eq!(config.delay_for(2, None), Duration::from_millis(200));
        assert_eq!(config.delay_for(3, None), Duration::from_millis(300));
        // A server hint wins when it asks for longer, up to the cap
        assert_eq!(config.delay_for(1, Some(250)), Duration::from_millis(250));
        assert_eq!(config.delay_for(1, Some(2_000)), Duration::from_millis(300));
        assert_eq!(config.delay_for(1, Some(u64::MAX)), Duration::from_millis(300));
    }
}
