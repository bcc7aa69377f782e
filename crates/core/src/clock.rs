//! Clock abstraction for testable time handling.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of wall-clock and monotonic time, abstracted so sentinel and
/// backoff logic can be driven deterministically in tests.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, for measuring elapsed durations.
    fn now(&self) -> Instant;
    /// Wall-clock time, for comparing against file mtimes.
    fn wall_now(&self) -> SystemTime;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Fake clock for deterministic tests.
#[derive(Clone)]
pub struct FakeClock {
    monotonic: Arc<Mutex<Instant>>,
    wall: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            monotonic: Arc::new(Mutex::new(Instant::now())),
            wall: Arc::new(Mutex::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.monotonic.lock() += duration;
        *self.wall.lock() += duration;
    }

    pub fn set_wall(&self, time: SystemTime) {
        *self.wall.lock() = time;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.monotonic.lock()
    }

    fn wall_now(&self) -> SystemTime {
        *self.wall.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
