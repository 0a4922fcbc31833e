//! Retry with exponential backoff and jitter around a single adapter call

use std::time::Duration;

use rand::Rng;

use crate::error::FetchError;

/// Backoff parameters: `min(base * multiplier^attempt, max_delay) + jitter`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts per call, first one included
    pub max_attempts: u32,
    pub base: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of the uniform random offset
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic part of the delay after the `attempt`-th failure (0-based)
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.base.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Full delay including a random jitter offset
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let offset = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.exponential(attempt) + Duration::from_millis(offset)
    }
}

/// Backoff/retry controller.
///
/// Retries transient failures only. Quota, client and malformed-response
/// failures go straight back to the caller; exhausting the attempt budget
/// turns the last transient failure into [`FetchError::RetriesExhausted`].
pub struct Retrier {
    policy: BackoffPolicy,
    /// Courtesy pause between successive work items
    request_delay: Duration,
    sleeper: fn(Duration),
    consecutive_failures: u32,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .field("request_delay", &self.request_delay)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn new(policy: BackoffPolicy, request_delay: Duration) -> Self {
        Self {
            policy,
            request_delay,
            sleeper: std::thread::sleep,
            consecutive_failures: 0,
        }
    }

    /// Replace the sleep function (tests use a no-op)
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Transient failures since the last successful call
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run `attempt_fn` until it succeeds, fails non-transiently, or the
    /// attempt budget runs out.
    pub fn call<T>(
        &mut self,
        label: &str,
        mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match attempt_fn() {
                Ok(v) => {
                    self.consecutive_failures = 0;
                    return Ok(v);
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    self.consecutive_failures += 1;
                    if attempt >= max_attempts {
                        log::error!("{label}: failed permanently after {attempt} attempts: {e}");
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.policy.delay(attempt - 1);
                    log::debug!(
                        "{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    (self.sleeper)(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep the inter-request courtesy delay
    pub fn pace(&self) {
        if !self.request_delay.is_zero() {
            (self.sleeper)(self.request_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn no_sleep(_: Duration) {}

    thread_local! {
        static SLEPT: RefCell<Vec<Duration>> = const { RefCell::new(Vec::new()) };
    }

    fn record_sleep(d: Duration) {
        SLEPT.with(|s| s.borrow_mut().push(d));
    }

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: Duration::ZERO,
        }
    }

    fn transient() -> FetchError {
        FetchError::from_status(503, "unavailable")
    }

    #[test]
    fn exponential_grows_and_caps() {
        let p = policy(5);
        assert_eq!(p.exponential(0), Duration::from_secs(1));
        assert_eq!(p.exponential(1), Duration::from_secs(2));
        assert_eq!(p.exponential(3), Duration::from_secs(8));
        assert_eq!(p.exponential(4), Duration::from_secs(10));
        assert_eq!(p.exponential(1000), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = BackoffPolicy {
            jitter: Duration::from_millis(500),
            ..policy(5)
        };
        for _ in 0..50 {
            let d = p.delay(1);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut retrier = Retrier::new(policy(4), Duration::ZERO).with_sleeper(no_sleep);
        let calls = Cell::new(0);
        let result: Result<(), _> = retrier.call("t", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert_eq!(calls.get(), 4);
        match result {
            Err(FetchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.is_retryable());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut retrier = Retrier::new(policy(5), Duration::ZERO).with_sleeper(no_sleep);
        let calls = Cell::new(0);
        let result = retrier.call("t", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(transient())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
        assert_eq!(retrier.consecutive_failures(), 0);
    }

    #[test]
    fn quota_is_not_retried() {
        let mut retrier = Retrier::new(policy(5), Duration::ZERO).with_sleeper(no_sleep);
        let calls = Cell::new(0);
        let result: Result<(), _> = retrier.call("t", || {
            calls.set(calls.get() + 1);
            Err(FetchError::quota("Queries per day"))
        });
        assert_eq!(calls.get(), 1);
        assert!(result.unwrap_err().is_quota());
    }

    #[test]
    fn malformed_is_not_retried() {
        let mut retrier = Retrier::new(policy(5), Duration::ZERO).with_sleeper(no_sleep);
        let calls = Cell::new(0);
        let result: Result<(), _> = retrier.call("t", || {
            calls.set(calls.get() + 1);
            Err(FetchError::malformed("missing totalResults"))
        });
        assert_eq!(calls.get(), 1);
        assert!(matches!(
            result,
            Err(FetchError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn backoff_restarts_after_success() {
        SLEPT.with(|s| s.borrow_mut().clear());
        let mut retrier = Retrier::new(policy(5), Duration::ZERO).with_sleeper(record_sleep);

        for _ in 0..2 {
            let calls = Cell::new(0);
            retrier
                .call("t", || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 3 {
                        Err(transient())
                    } else {
                        Ok(())
                    }
                })
                .unwrap();
        }

        let slept = SLEPT.with(|s| s.borrow().clone());
        let expected = [1, 2, 1, 2].map(Duration::from_secs);
        assert_eq!(slept, expected);
    }

    #[test]
    fn pace_skips_zero_delay() {
        SLEPT.with(|s| s.borrow_mut().clear());
        Retrier::new(policy(1), Duration::ZERO)
            .with_sleeper(record_sleep)
            .pace();
        Retrier::new(policy(1), Duration::from_millis(250))
            .with_sleeper(record_sleep)
            .pace();
        let slept = SLEPT.with(|s| s.borrow().clone());
        assert_eq!(slept, [Duration::from_millis(250)]);
    }
}
