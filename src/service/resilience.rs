use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::service::error::ErrorClass;

/// Names the degraded variant the fallback chain should start from for
/// a given failure class.
pub fn fallback_entry_point(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Timeout => "simple",
        ErrorClass::Network => "keyword",
        ErrorClass::Data => "statistical",
        ErrorClass::Unknown => "simple",
    }
}

/// Backoff delay before retry `attempt` (0-based): 2^attempt seconds
/// plus up to one second of jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt);
    let jitter = rand::rng().random_range(0.0..1.0);
    Duration::from_millis(base * 1000 + (jitter * 1000.0) as u64)
}

/// Retries `operation` up to `max_attempts` times, sleeping with
/// exponential backoff between attempts. Only failures the caller marks
/// transient are retried.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts.max(1) || !is_transient(&error) {
                    return Err(error);
                }
                let delay = backoff_delay(attempt - 1);
                tracing::debug!("Transient failure, retrying in {:?} (attempt {})", delay, attempt);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Circuit breaker shared process-wide around the routing API. Opens
/// after `fail_max` consecutive failures, short-circuits during
/// `reset_timeout`, then admits a single half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    fail_max: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(fail_max: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            fail_max: fail_max.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed. An expired open state transitions to
    /// half-open and admits exactly one probe.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.reset_timeout {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        *state = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        *state = match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.fail_max {
                    tracing::warn!("Circuit breaker opened after {} consecutive failures", failures);
                    BreakerState::Open { since: Instant::now() }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            BreakerState::HalfOpen => BreakerState::Open { since: Instant::now() },
            open => open,
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock().unwrap(), BreakerState::Open { .. })
    }

    pub fn state_name(&self) -> &'static str {
        match *self.state.lock().unwrap() {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn breaker_opens_after_max_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert!(!breaker.is_open());
        }
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        // Open, but the reset timeout already elapsed: one probe allowed.
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state_name(), "half-open");
        // Second caller is rejected while the probe is in flight.
        assert!(!breaker.try_acquire());
        breaker.record_success();
        assert!(breaker.try_acquire());
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[tokio::test]
    async fn retry_stops_on_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(3, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("permanent") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhausts_transient_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(3, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("transient") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn entry_points_follow_error_class() {
        assert_eq!(fallback_entry_point(ErrorClass::Timeout), "simple");
        assert_eq!(fallback_entry_point(ErrorClass::Network), "keyword");
        assert_eq!(fallback_entry_point(ErrorClass::Data), "statistical");
        assert_eq!(fallback_entry_point(ErrorClass::Unknown), "simple");
    }
}
