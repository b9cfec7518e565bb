//! Retry policy: exponential backoff with additive jitter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classifies an error as worth retrying or not.
pub trait Retryable {
    /// Transient errors are retried; anything else fails at once.
    fn is_transient(&self) -> bool {
        true
    }
}

/// Random draw used to spread retries out.
pub trait Jitter: Send + Sync + fmt::Debug {
    /// Return a duration in `[0, upper)`. Must return zero when `upper` is zero.
    fn sample(&self, upper: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Default, Copy, Clone)]
pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn sample(&self, upper: Duration) -> Duration {
        let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
        if upper_nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..upper_nanos))
    }
}

/// Deterministic jitter: always the same fraction of the upper bound.
#[derive(Debug, Copy, Clone)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&self, upper: Duration) -> Duration {
        upper.mul_f64(self.0.clamp(0.0, 1.0))
    }
}

/// Serializable retry knobs (config surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub const fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }
}

/// Terminal error after the policy gave up.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {error}")]
pub struct RetryExhausted<E> {
    /// Attempts made, including the first one.
    pub attempts: u32,
    /// The last error seen.
    pub error: E,
}

/// Retry policy.
///
/// `max_retries` counts retries, so an operation runs at most
/// `max_retries + 1` times. The delay after failed attempt `n` (0-based) is
/// `min(base_delay * 2^n + jitter(0..base_delay), max_delay)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    jitter: Arc<dyn Jitter>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self::exponential(
            s.max_retries,
            Duration::from_millis(s.base_delay_ms),
            Duration::from_millis(s.max_delay_ms),
        )
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self::exponential(0, Duration::ZERO, Duration::ZERO)
    }

    /// Replace the random source (tests inject [`FixedJitter`]).
    pub fn with_jitter(mut self, jitter: impl Jitter + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Total attempts the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = 1u32
            .checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor));

        match exponential {
            Some(delay) => delay
                .saturating_add(self.jitter.sample(self.base_delay))
                .min(self.max_delay),
            None => self.max_delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts run out. `op` receives the 0-based attempt index.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let attempts = attempt + 1;
                    if !error.is_transient() || attempt >= self.max_retries {
                        warn!(op = label, attempts, error = %error, "giving up");
                        return Err(RetryExhausted { attempts, error });
                    }

                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        op = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(if self.0 { "transient" } else { "fatal" })
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_retries, Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(FixedJitter(0.0))
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let p = policy(5);
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn jitter_is_added_within_base_delay() {
        let p = policy(5).with_jitter(FixedJitter(0.5));
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(150));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(450));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy(5);
        assert_eq!(p.delay_for_attempt(10), Duration::from_secs(10));
        assert_eq!(p.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn thread_rng_jitter_stays_below_upper() {
        let j = ThreadRngJitter;
        assert_eq!(j.sample(Duration::ZERO), Duration::ZERO);
        for _ in 0..1000 {
            assert!(j.sample(Duration::from_millis(3)) < Duration::from_millis(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(5)
            .execute("test", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(Flaky(true)) } else { Ok(n) } }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let err = policy(3)
            .execute("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Flaky(true)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Sleeps after attempts 0, 1, 2 only; none after the last one.
        assert_eq!(started.elapsed(), Duration::from_millis(100 + 200 + 400));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(5)
            .execute("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Flaky(false)) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Delays never shrink as attempts grow and never exceed the cap.
            #[test]
            fn delay_is_monotone_and_capped(
                base_ms in 0u64..5_000,
                max_ms in 0u64..600_000,
                fraction in 0.0f64..1.0,
                attempts in 1u32..40,
            ) {
                let p = RetryPolicy::exponential(
                    attempts,
                    Duration::from_millis(base_ms),
                    Duration::from_millis(max_ms),
                )
                .with_jitter(FixedJitter(fraction));

                let mut previous = Duration::ZERO;
                for attempt in 0..attempts {
                    let delay = p.delay_for_attempt(attempt);
                    prop_assert!(delay >= previous);
                    prop_assert!(delay <= p.max_delay);
                    previous = delay;
                }
            }
        }
    }
}
