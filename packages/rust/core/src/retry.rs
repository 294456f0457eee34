//! Bounded exponential backoff with jitter for rate-limited remote calls.
//!
//! Only failures that carry a rate-limit signal are retried. Everything else
//! passes straight through on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use roofscout_shared::{PipelineConfig, RoofScoutError};

/// Classifies a failure as quota exhaustion (retryable) or not.
pub trait RateLimitSignal {
    fn is_rate_limit(&self) -> bool;
}

impl RateLimitSignal for RoofScoutError {
    fn is_rate_limit(&self) -> bool {
        RoofScoutError::is_rate_limit(self)
    }
}

/// Reported to the caller just before a backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    /// How long the executor will wait before the next attempt.
    pub delay: Duration,
}

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles on each further failure.
    pub base_delay: Duration,
    /// Exclusive upper bound of the uniform jitter added to each wait.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_jitter: config.max_jitter,
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait after failed attempt `attempt` (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Full wait: `base * 2^attempt + uniform[0, max_jitter)`.
    pub fn delay_for_attempt<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.random_range(0..jitter_ms))
        };
        self.backoff_for_attempt(attempt) + jitter
    }
}

/// Runs an operation under a [`RetryPolicy`].
///
/// Each [`execute`](Self::execute) call has its own attempt budget; the
/// random source is supplied per call so runs can be seeded.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Call `operation` until it succeeds, fails without a rate-limit
    /// signal, or exhausts the attempt budget. The last error is returned
    /// unchanged. `on_retry` fires before every backoff sleep.
    pub async fn execute<T, E, F, Fut, R>(
        &self,
        rng: &mut R,
        mut operation: F,
        mut on_retry: impl FnMut(RetryNotice),
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal + Display,
        R: Rng,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limit() && attempt + 1 < max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt, rng);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "rate limited, backing off"
                    );
                    on_retry(RetryNotice { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::Cell;

    fn rate_limited() -> RoofScoutError {
        RoofScoutError::from_status(429, "RESOURCE_EXHAUSTED: quota")
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_try() {
        let executor = RetryExecutor::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut notices = Vec::new();

        let result: Result<&str, RoofScoutError> = executor
            .execute(&mut rng, || async { Ok("done") }, |n| notices.push(n))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert!(notices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_rate_limits_with_bounded_delays() {
        let executor = RetryExecutor::default();
        let mut rng = StdRng::seed_from_u64(7);
        let calls = Cell::new(0u32);
        let mut notices = Vec::new();
        let start = tokio::time::Instant::now();

        let result = executor
            .execute(
                &mut rng,
                || {
                    let n = calls.get();
                    calls.set(n + 1);
                    async move { if n < 3 { Err(rate_limited()) } else { Ok(n) } }
                },
                |notice| notices.push(notice),
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 4);
        assert_eq!(notices.len(), 3);

        for notice in &notices {
            let floor = Duration::from_millis(2000) * 2u32.pow(notice.attempt - 1);
            assert!(notice.delay >= floor, "{notice:?} below {floor:?}");
            assert!(notice.delay < floor + Duration::from_millis(1000), "{notice:?} too long");
        }
        assert_eq!(
            notices.iter().map(|n| n.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let waited: Duration = notices.iter().map(|n| n.delay).sum();
        assert!(start.elapsed() >= waited);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        });
        let mut rng = StdRng::seed_from_u64(3);
        let calls = Cell::new(0u32);
        let mut notices = 0;

        let result: Result<(), RoofScoutError> = executor
            .execute(
                &mut rng,
                || {
                    calls.set(calls.get() + 1);
                    let attempt = calls.get();
                    async move {
                        Err(RoofScoutError::RateLimited {
                            status: 429,
                            message: format!("attempt {attempt}"),
                        })
                    }
                },
                |_| notices += 1,
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("attempt 3"));
        assert_eq!(calls.get(), 3);
        assert_eq!(notices, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_error_fails_immediately() {
        let executor = RetryExecutor::default();
        let mut rng = StdRng::seed_from_u64(5);
        let calls = Cell::new(0u32);
        let mut notices = 0;
        let start = tokio::time::Instant::now();

        let result: Result<(), RoofScoutError> = executor
            .execute(
                &mut rng,
                || {
                    calls.set(calls.get() + 1);
                    async { Err(RoofScoutError::from_status(401, "API key not valid")) }
                },
                |_| notices += 1,
            )
            .await;

        assert!(matches!(result, Err(RoofScoutError::Provider { status: 401, .. })));
        assert_eq!(calls.get(), 1);
        assert_eq!(notices, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(4000));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(16000));
    }

    #[test]
    fn jitter_is_reproducible_with_seed() {
        let policy = RetryPolicy::default();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for attempt in 0..4 {
            assert_eq!(
                policy.delay_for_attempt(attempt, &mut a),
                policy.delay_for_attempt(attempt, &mut b)
            );
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let policy = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(policy.delay_for_attempt(2, &mut rng), Duration::from_millis(8000));
    }
}
