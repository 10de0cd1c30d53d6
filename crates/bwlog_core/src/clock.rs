//! Time sources for stamping entries.

use crate::types::LogTime;
use parking_lot::Mutex;
use std::sync::Arc;

/// Supplies the time stamped onto each appended entry.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> LogTime;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> LogTime {
        LogTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle after giving
/// one to a writer.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<LogTime>>,
}

impl ManualClock {
    /// Creates a clock reading `time`.
    #[must_use]
    pub fn new(time: LogTime) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Sets the time.
    pub fn set(&self, time: LogTime) {
        *self.time.lock() = time;
    }

    /// Moves the clock forward by `millis`.
    pub fn advance_millis(&self, millis: u64) {
        let mut time = self.time.lock();
        *time = time.add_millis(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> LogTime {
        *self.time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shared() {
        let clock = ManualClock::new(LogTime::new(10, 0));
        let handle = clock.clone();

        handle.advance_millis(1500);
        assert_eq!(clock.now(), LogTime::new(11, 500));

        handle.set(LogTime::new(3, 1));
        assert_eq!(clock.now(), LogTime::new(3, 1));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > LogTime::new(1_000_000_000, 0));
    }
}
