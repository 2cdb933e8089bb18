//! Tick-based timestamps, wall-clock sources, the monotonic clock and time ids.
//!
//! A tick is 100 nanoseconds. Timestamps count ticks since
//! `0001-01-01T00:00:00Z`, which keeps the decimal tick count used in
//! partition keys and column names compatible with existing series data.

pub mod clock;
pub mod time_id;

pub use clock::{ClockConfig, PreciseClock};
pub use time_id::{TimeId, CLOSING_ID};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds per tick.
pub const NANOS_PER_TICK: u128 = 100;

/// Ticks per microsecond.
pub const TICKS_PER_MICROSECOND: i64 = 10;

/// Ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick count of the Unix epoch (`1970-01-01T00:00:00Z`).
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Converts a duration to whole ticks, saturating at `i64::MAX`.
pub fn duration_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / NANOS_PER_TICK).unwrap_or(i64::MAX)
}

/// A point in time as a count of 100ns ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const UNIX_EPOCH: Timestamp = Timestamp(UNIX_EPOCH_TICKS);

    /// Creates a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Reads the system wall clock.
    ///
    /// This is not monotonic. Use [`PreciseClock`] when ordering matters.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns this timestamp moved by `ticks` (which may be negative).
    pub fn add_ticks(self, ticks: i64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Converts a `SystemTime` to a timestamp.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self(UNIX_EPOCH_TICKS.saturating_add(duration_ticks(since))),
            Err(err) => Self(UNIX_EPOCH_TICKS.saturating_sub(duration_ticks(err.duration()))),
        }
    }

    /// Converts this timestamp to a `SystemTime`.
    pub fn to_system_time(self) -> SystemTime {
        let delta = self.0.saturating_sub(UNIX_EPOCH_TICKS);
        let nanos = |ticks: i64| Duration::from_nanos(ticks.unsigned_abs().saturating_mul(100));
        if delta >= 0 {
            UNIX_EPOCH + nanos(delta)
        } else {
            UNIX_EPOCH - nanos(delta)
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        self.add_ticks(duration_ticks(rhs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of wall-clock ticks for [`PreciseClock`].
pub trait TimeSource: Send + Sync {
    /// Returns the current wall-clock time in ticks.
    fn now_ticks(&self) -> i64;
}

/// Wall clock backed by `SystemTime::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ticks(&self) -> i64 {
        Timestamp::now().ticks()
    }
}

/// Settable wall clock for tests and simulations.
///
/// # Examples
/// ```rust,ignore
/// use alopex_timeline::time::{ManualTimeSource, Timestamp};
///
/// let source = ManualTimeSource::new(Timestamp::UNIX_EPOCH);
/// source.advance(std::time::Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct ManualTimeSource {
    ticks: AtomicI64,
}

impl ManualTimeSource {
    /// Creates a source frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            ticks: AtomicI64::new(start.ticks()),
        }
    }

    /// Moves the source to `timestamp`.
    pub fn set(&self, timestamp: Timestamp) {
        self.ticks.store(timestamp.ticks(), Ordering::Release);
    }

    /// Moves the source forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.ticks.fetch_add(duration_ticks(duration), Ordering::AcqRel);
    }

    /// Returns the current value.
    pub fn get(&self) -> Timestamp {
        Timestamp::from_ticks(self.ticks.load(Ordering::Acquire))
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch_round_trip() {
        assert_eq!(Timestamp::from_system_time(UNIX_EPOCH), Timestamp::UNIX_EPOCH);
        assert_eq!(Timestamp::UNIX_EPOCH.to_system_time(), UNIX_EPOCH);
    }

    #[test]
    fn test_system_time_round_trip_truncates_to_ticks() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let ts = Timestamp::from_system_time(time);
        assert_eq!(ts.ticks(), UNIX_EPOCH_TICKS + 17_000_000_001_234_567);
        assert_eq!(
            ts.to_system_time(),
            UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_700)
        );
    }

    #[test]
    fn test_before_unix_epoch() {
        let time = UNIX_EPOCH - Duration::from_secs(1);
        let ts = Timestamp::from_system_time(time);
        assert_eq!(ts.ticks(), UNIX_EPOCH_TICKS - TICKS_PER_SECOND);
        assert_eq!(ts.to_system_time(), time);
    }

    #[test]
    fn test_add_duration_and_ticks() {
        let ts = Timestamp::from_ticks(1_000);
        assert_eq!(ts + Duration::from_micros(3), Timestamp::from_ticks(1_030));
        assert_eq!(ts.add_ticks(-1), Timestamp::from_ticks(999));
        assert_eq!(Timestamp::from_ticks(i64::MAX).add_ticks(1).ticks(), i64::MAX);
    }

    #[test]
    fn test_duration_ticks() {
        assert_eq!(duration_ticks(Duration::from_millis(1)), TICKS_PER_MILLISECOND);
        assert_eq!(duration_ticks(Duration::from_nanos(99)), 0);
        assert_eq!(duration_ticks(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_manual_source() {
        let source = ManualTimeSource::new(Timestamp::from_ticks(10));
        source.advance(Duration::from_micros(1));
        assert_eq!(source.now_ticks(), 20);
        source.set(Timestamp::from_ticks(5));
        assert_eq!(source.get(), Timestamp::from_ticks(5));
    }
}
