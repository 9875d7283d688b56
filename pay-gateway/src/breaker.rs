//! Per-tenant circuit breaker over gateway submissions (§4.3). Tracked
//! in-process; one instance guards one tenant's traffic so a flaky gateway
//! endpoint for one merchant doesn't fail-fast calls for another.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Closed,
    Open { opened_at: Instant },
    /// A probe call has been admitted and not yet resolved.
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
}

/// Trips to `open` after `failure_threshold` consecutive failures, stays
/// open for `cooldown`, then admits exactly one probe call in `half_open`.
/// The probe's outcome closes (success) or reopens (failure) the breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

/// Whether a call may currently proceed, and if not, why.
#[derive(Debug, Eq, PartialEq)]
pub enum Admission {
    Allowed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner { state: State::Closed, consecutive_failures: 0 }),
        }
    }

    /// Default per §4.3: no explicit threshold/cooldown named in the source,
    /// so 5 consecutive failures / 30s cooldown is chosen as a conservative
    /// default matching the gateway's own request timeout.
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Call before attempting a gateway submission. If this transitions the
    /// breaker from `open` to `half_open`, the returned `Allowed` is for the
    /// single admitted probe; concurrent callers racing this transition all
    /// see the same state change since it's made under the lock.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Admission::Allowed,
            State::HalfOpen => Admission::Rejected,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    inner.state = State::HalfOpen;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open { opened_at: Instant::now() };
                inner.consecutive_failures = self.failure_threshold;
            }
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open { opened_at: Instant::now() };
                }
            }
            State::Open { .. } => {
                // Already open; a failure here just means the window hasn't
                // reached its cooldown. Nothing to update.
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Open { .. })
    }
}

#[cfg(test)]
mod test {
    use std::thread::sleep;

    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        for _ in 0..3 {
            assert_eq!(breaker.try_acquire(), Admission::Allowed);
            breaker.on_failure();
        }
        assert!(breaker.is_open());
        assert_eq!(breaker.try_acquire(), Admission::Rejected);
    }

    #[test]
    fn half_open_probe_admits_exactly_one() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.try_acquire();
        breaker.on_failure();
        assert!(breaker.is_open());

        sleep(Duration::from_millis(15));
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        // A second concurrent caller sees half-open, not another probe slot.
        assert_eq!(breaker.try_acquire(), Admission::Rejected);
    }

    #[test]
    fn success_in_half_open_closes_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.try_acquire();
        breaker.on_failure();
        sleep(Duration::from_millis(15));
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        breaker.on_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
    }

    #[test]
    fn failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.try_acquire();
        breaker.on_failure();
        sleep(Duration::from_millis(15));
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        breaker.on_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn success_resets_failure_count_in_closed_state() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        breaker.on_failure();
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        breaker.on_failure();
        // Two more failures after the reset shouldn't trip a threshold of 3.
        assert!(!breaker.is_open());
    }
}
