//! Retry strategy with exponential backoff for transient errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use storebridge_common::{Error, Operation, Result};

/// Attempts made when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay (cap for exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate delay after the given (zero-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Add random jitter of +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Successful result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// Value produced by the last attempt.
    pub value: T,
    /// Number of attempts it took, at least 1.
    pub attempts: u32,
}

/// Retry executor for running operations with retry logic.
///
/// Transient errors (see [`Error::is_transient`]) are retried with growing
/// delays until the attempt budget is spent; the last error is then wrapped,
/// unchanged, in [`Error::Exhausted`]. Permanent errors are returned as-is
/// after a single attempt.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation with retry logic.
    pub async fn execute<F, Fut, T>(&self, operation: Operation, query: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_reporting(operation, query, f)
            .await
            .map(|attempted| attempted.value)
    }

    /// Execute an operation with retry logic, reporting the attempts used.
    pub async fn execute_reporting<F, Fut, T>(
        &self,
        operation: Operation,
        query: &str,
        f: F,
    ) -> Result<Attempted<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            "{} of '{}' succeeded after {} attempts",
                            operation, query, attempt
                        );
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    if attempt >= max_attempts {
                        warn!(
                            "{} of '{}' failed after {} attempts: {}",
                            operation, query, attempt, err
                        );
                        return Err(Error::Exhausted {
                            operation,
                            query: query.to_string(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.config.delay_for_attempt(attempt - 1);
                    warn!(
                        "{} of '{}' attempt {} failed: {}. Retrying in {:?}...",
                        operation, query, attempt, err, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(
            RetryConfig::new(max_attempts)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    /// Fails transiently `failures` times, then returns 42.
    async fn flaky(count: Arc<AtomicU32>, failures: u32) -> Result<i32> {
        let current = count.fetch_add(1, Ordering::SeqCst);
        if current < failures {
            Err(Error::Transient("Connection reset".to_string()))
        } else {
            Ok(42)
        }
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        // 1 * 10^5 = 100000 seconds, but should be capped at 10
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(1000));
        for _ in 0..50 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let executor = RetryExecutor::default();

        let result = executor
            .execute_reporting(Operation::Exists, "a.txt", || async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(result, Attempted { value: 42, attempts: 1 });
    }

    #[tokio::test]
    async fn test_succeeds_within_budget() {
        let count = Arc::new(AtomicU32::new(0));
        let executor = fast_executor(3);

        let result = executor
            .execute_reporting(Operation::Size, "a.txt", || flaky(count.clone(), 2))
            .await
            .unwrap();

        assert_eq!(result.value, 42);
        assert_eq!(result.attempts, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let count = Arc::new(AtomicU32::new(0));
        let executor = fast_executor(2);

        let err = executor
            .execute(Operation::Retrieve, "s3://bucket/a.txt", || flaky(count.clone(), 2))
            .await
            .unwrap_err();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        match err {
            Error::Exhausted {
                operation,
                query,
                attempts,
                source,
            } => {
                assert_eq!(operation, Operation::Retrieve);
                assert_eq!(query, "s3://bucket/a.txt");
                assert_eq!(attempts, 2);
                assert!(matches!(*source, Error::Transient(_)));
            }
            other => panic!("expected Exhausted, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let count = Arc::new(AtomicU32::new(0));
        let executor = fast_executor(5);

        let result: Result<i32> = executor
            .execute(Operation::Mtime, "a.txt", || {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::NotFound("a.txt".to_string()))
                }
            })
            .await;

        // Should only try once because NotFound is not retryable
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let count = Arc::new(AtomicU32::new(0));
        let executor = fast_executor(0);

        let result = executor
            .execute(Operation::Exists, "a.txt", || flaky(count.clone(), 0))
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
