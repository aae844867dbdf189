//! Clock abstraction used by the connection pool's circuit breaker, the
//! retry backoff scheduler, and event scheduling -- anywhere the runtime
//! needs "now" but must stay deterministically testable.
//!
//! Generalizes the teacher's `ClockSource`/`SystemClock` (`morm-core::hlc`)
//! from a millis-since-epoch counter to a `chrono` UTC timestamp, since the
//! runtime's timers reason in wall-clock durations rather than a logical
//! clock's causal ordering.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Abstraction over wall-clock time, for dependency injection.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default clock, delegating to the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is only advanced by explicit calls, for
/// deterministic tests of time-based behavior (circuit breaker cooldowns,
/// retry backoff, event bus redelivery delays).
#[derive(Debug)]
pub struct VirtualClock {
    current: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.current.lock();
        *guard += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock() = at;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_moves_on_advance() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let clock = VirtualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));
    }
}
