//! Retry policies with exponential backoff
//!
//! Retries operations whose failure kind is retryable (transient failures and
//! rate limiting) and fails fast on everything else.

use crate::api::error::ApiError;
use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, initial try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

/// Retry policy that implements exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.execute_cancellable(&CancellationToken::new(), operation).await
    }

    /// Execute an operation with retry logic, aborting any backoff sleep once
    /// `cancel` fires. A cancelled backoff surfaces the last observed error.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Executing operation (attempt {}/{})", attempt, max_attempts);

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                warn!(
                    "Operation failed permanently on attempt {} (retryable: {}): {}",
                    attempt,
                    error.is_retryable(),
                    error
                );
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            warn!(
                "Operation failed on attempt {} (retryable), waiting {:?}: {}",
                attempt, delay, error
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Retry backoff cancelled after attempt {}", attempt);
                    return Err(error);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Delay before the attempt following `attempt`, honoring a larger
    /// server-provided retry-after on rate limit errors
    pub fn delay_for(&self, attempt: u32, error: &ApiError) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match error.retry_after() {
            Some(retry_after) if retry_after > backoff => retry_after,
            _ => backoff,
        }
    }

    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`, optionally jittered
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let mut delay = self
            .config
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.config.max_delay);

        if self.config.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            delay = delay.mul_f64(jitter_factor);
        }

        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiErrorKind;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32, base_delay_ms: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(30),
            jitter: false,
        })
    }

    /// Records the instant of every attempt so tests can check the gaps between them
    #[derive(Clone, Default)]
    struct AttemptLog(Arc<Mutex<Vec<Instant>>>);

    impl AttemptLog {
        fn record(&self) -> usize {
            let mut attempts = self.0.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let attempts = self.0.lock().unwrap();
            attempts.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = policy(5, 100);

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: false,
        });

        assert_eq!(policy.calculate_delay(5), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::new(RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        });

        for _ in 0..50 {
            let delay = policy.calculate_delay(2);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_retry_after_preferred_when_larger() {
        let policy = policy(3, 1000);
        let limited = ApiError::new(ApiErrorKind::RateLimitExceeded, "slow down")
            .with_retry_after(Duration::from_secs(10));
        let short = ApiError::new(ApiErrorKind::RateLimitExceeded, "slow down")
            .with_retry_after(Duration::from_millis(10));

        assert_eq!(policy.delay_for(1, &limited), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1, &short), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_exhausts_attempts() {
        let log = AttemptLog::default();

        let result: Result<(), ApiError> = policy(3, 1000)
            .execute(|| {
                let n = log.record();
                async move {
                    Err(ApiError::new(ApiErrorKind::TransientError, format!("attempt {}", n)))
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ApiErrorKind::TransientError);
        assert_eq!(error.message(), "attempt 3");
        assert_eq!(log.count(), 3);
        assert_eq!(
            log.gaps(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt() {
        let log = AttemptLog::default();
        let start = Instant::now();

        let result = policy(3, 1000)
            .execute(|| {
                let n = log.record();
                async move {
                    if n == 1 {
                        Err(ApiError::new(ApiErrorKind::TransientError, "blip"))
                    } else {
                        Ok("Success!")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success!");
        assert_eq!(log.count(), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let log = AttemptLog::default();
        let start = Instant::now();

        let result: Result<(), ApiError> = policy(3, 1000)
            .execute(|| {
                log.record();
                async { Err(ApiError::new(ApiErrorKind::AuthError, "bad token").with_status(401)) }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ApiErrorKind::AuthError);
        assert_eq!(error.status(), Some(401));
        assert_eq!(log.count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honors_retry_after() {
        let log = AttemptLog::default();

        let result = policy(3, 1000)
            .execute(|| {
                let n = log.record();
                async move {
                    if n == 1 {
                        Err(ApiError::new(ApiErrorKind::RateLimitExceeded, "429")
                            .with_retry_after(Duration::from_secs(5)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(log.gaps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_backoff() {
        let log = AttemptLog::default();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result: Result<(), ApiError> = policy(3, 1000)
            .execute_cancellable(&cancel, || {
                log.record();
                async { Err(ApiError::new(ApiErrorKind::TransientError, "down")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ApiErrorKind::TransientError);
        assert_eq!(log.count(), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_single_attempt_config() {
        let log = AttemptLog::default();

        let result: Result<(), ApiError> = policy(1, 1000)
            .execute(|| {
                log.record();
                async { Err(ApiError::new(ApiErrorKind::TransientError, "down")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(log.count(), 1);
    }
}
