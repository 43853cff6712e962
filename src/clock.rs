//! Monotonic time sources.
//!
//! Every deadline in the engine (rollback timeouts, the batch window, staleness) is measured
//! against a [`Clock`]. Production code uses [`SystemClock`]; tests drive a [`ManualClock`]
//! forward explicitly so timeout behavior is deterministic.

use parking_lot::Mutex;
use std::sync::Arc;
use web_time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A monotonic time source.
#[cfg(feature = "sync-send")]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// A monotonic time source.
#[cfg(not(feature = "sync-send"))]
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep one handle and give another to the
/// engine.
///
/// ```
/// use turnsync::clock::{Clock, ManualClock};
/// use web_time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(1600));
/// assert_eq!(clock.now() - start, Duration::from_millis(1600));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Creates a manual clock starting at the current real instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Returns wall-clock milliseconds since the UNIX epoch, for wire timestamps.
///
/// Wall-clock time can go backwards (NTP adjustments, VM snapshots); in that case this
/// returns 0 rather than failing, since the timestamp is informational only.
#[must_use]
pub fn millis_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(millis_since_epoch() > 1_577_836_800_000);
    }
}
