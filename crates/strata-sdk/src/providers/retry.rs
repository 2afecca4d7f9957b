//! Retry with exponential, capped backoff.
//!
//! Shared by the provider router (per-provider retries) and the vector-store
//! write queue (per-batch persistence retries). Every wait honours the
//! caller's [`RequestContext`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::context::RequestContext;
use crate::error::StrataResult;

/// Retry strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier (usually 2.0)
    pub backoff_multiplier: f64,
    /// Whether to add ±10% jitter to delays
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        }
    }
}

impl RetryConfig {
    /// No retries at all; used for health probes.
    pub fn single_attempt() -> Self {
        RetryConfig {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// The last error of an operation that ran out of attempts (or hit a
/// non-retryable error).
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

/// Retry strategy executor.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        RetryStrategy { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `retry` (0-based): initial * multiplier^retry, capped.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base_millis = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(retry as i32);
        let capped = base_millis.min(self.config.max_delay.as_millis() as f64);

        if self.config.jitter_enabled {
            let jitter_factor = rand::thread_rng().gen_range(0.9..=1.1);
            Duration::from_millis((capped * jitter_factor) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or runs out
    /// of attempts.
    ///
    /// The outer result carries cancellation; the inner one carries the
    /// operation's own outcome.
    pub async fn execute<F, Fut, T, E, R>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        mut retryable: R,
        mut op: F,
    ) -> StrataResult<Result<T, RetryFailure<E>>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: FnMut(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = ctx.run(operation, None, async { Ok(op(attempt).await) }).await?;

            match result {
                Ok(value) => return Ok(Ok(value)),
                Err(error) => {
                    if attempt > self.config.max_retries || !retryable(&error) {
                        return Ok(Err(RetryFailure { error, attempts: attempt }));
                    }

                    let delay = self.next_delay(attempt - 1);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after failure"
                    );
                    ctx.sleep(operation, delay).await?;
                }
            }
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff() {
        let strategy = RetryStrategy::new(RetryConfig {
            initial_delay: Duration::from_millis(100),
            ..Default::default()
        });

        assert_eq!(strategy.next_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.next_delay(1), Duration::from_millis(200));
        assert_eq!(strategy.next_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let strategy = RetryStrategy::new(RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        });
        assert_eq!(strategy.next_delay(8), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let strategy = RetryStrategy::new(RetryConfig {
            initial_delay: Duration::from_millis(1000),
            jitter_enabled: true,
            ..Default::default()
        });
        for _ in 0..50 {
            let delay = strategy.next_delay(0).as_millis();
            assert!((900..=1100).contains(&delay), "delay {delay} out of range");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_then_succeeds() {
        let strategy = RetryStrategy::default();
        let calls = AtomicU32::new(0);

        let result = strategy
            .execute(&RequestContext::background(), "test", |_: &String| true, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 { Err(format!("failure {n}")) } else { Ok(n) }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_gives_up_after_max_retries() {
        let strategy = RetryStrategy::default();
        let failure = strategy
            .execute(&RequestContext::background(), "test", |_: &String| true, |attempt| async move {
                Err::<(), _>(format!("attempt {attempt}"))
            })
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error, "attempt 3");
    }

    #[tokio::test]
    async fn test_execute_stops_on_permanent_error() {
        let strategy = RetryStrategy::default();
        let failure = strategy
            .execute(&RequestContext::background(), "test", |_: &String| false, |_| async {
                Err::<(), _>("unauthorized".to_string())
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_cancelled_during_backoff() {
        let strategy = RetryStrategy::new(RetryConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..Default::default()
        });
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));

        let err = strategy
            .execute(&ctx, "test", |_: &String| true, |_| async { Err::<(), _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
