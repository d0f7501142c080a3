//! Injectable time source for trace timestamps.
//!
//! Trace nodes record the moment they were created. Production code reads the
//! real system clock; tests inject a [`ManualClock`] so that tree comparisons
//! and serialized output are deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the system clock for dependency injection.
///
/// Allows deterministic testing by replacing the real clock with a manual one.
/// The default implementation ([`SystemClock`]) delegates to `std::time::SystemTime`.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as u64
    }
}

/// Clock that advances only when told to.
///
/// `now()` returns the current value without side effects; call
/// [`ManualClock::advance`] between events to give them distinct timestamps.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at `start_millis`.
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// Moves the clock forward by `delta_millis`.
    pub fn advance(&self, delta_millis: u64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_nonzero() {
        let clock = SystemClock;
        assert!(clock.now() > 0);
    }

    #[test]
    fn manual_clock_starts_at_given_value() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), 1000);
        assert_eq!(clock.now(), 1000);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(0);
        clock.advance(5);
        assert_eq!(clock.now(), 5);
        clock.advance(10);
        assert_eq!(clock.now(), 15);
    }
}
