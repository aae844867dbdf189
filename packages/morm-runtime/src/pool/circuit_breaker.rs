//! Closed / Open / Half-Open circuit breaker guarding connection attempts.
//!
//! Structurally the same shape as the teacher's
//! `cluster::failure_detector::PhiAccrualFailureDetector`: a small
//! `Mutex`-protected state struct updated by success/failure observations,
//! driven by an injected [`Clock`] rather than real time so cooldown
//! transitions are deterministically testable.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// Tracks connection health and decides whether a new attempt should be
/// allowed through, per the pool's failure-isolation contract in §4.1.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Whether a new connection attempt should be allowed right now. In the
    /// `Open` state this also performs the `Open` -> `HalfOpen` transition
    /// once the cooldown has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let Some(opened_at) = inner.opened_at else {
                    return true;
                };
                let cooldown = ChronoDuration::milliseconds(i64::from(self.config.open_cooldown_ms));
                if self.clock.now() - opened_at >= cooldown {
                    inner.state = State::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => inner.consecutive_failures = 0,
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.half_open_success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(self.clock.now());
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(self.clock.now());
                inner.consecutive_successes = 0;
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn breaker(failure_threshold: u32, cooldown_ms: u64, half_open_threshold: u32) -> (CircuitBreaker, Arc<VirtualClock>) {
        let clock = Arc::new(VirtualClock::new(Utc::now()));
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold,
                open_cooldown_ms: cooldown_ms,
                half_open_success_threshold: half_open_threshold,
            },
            clock.clone(),
        );
        (cb, clock)
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let (cb, _clock) = breaker(3, 1_000, 1);
        assert_eq!(cb.state(), State::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), State::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), State::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn transitions_to_half_open_after_cooldown() {
        let (cb, clock) = breaker(1, 1_000, 1);
        cb.record_failure();
        assert_eq!(cb.state(), State::Open);
        assert!(!cb.allow());
        clock.advance(ChronoDuration::milliseconds(1_500));
        assert!(cb.allow());
        assert_eq!(cb.state(), State::HalfOpen);
    }

    #[test]
    fn closes_after_success_threshold_in_half_open() {
        let (cb, clock) = breaker(1, 1_000, 2);
        cb.record_failure();
        clock.advance(ChronoDuration::milliseconds(1_500));
        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), State::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), State::Closed);
    }

    #[test]
    fn reopens_on_failure_during_half_open() {
        let (cb, clock) = breaker(1, 1_000, 2);
        cb.record_failure();
        clock.advance(ChronoDuration::milliseconds(1_500));
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), State::Open);
    }
}
