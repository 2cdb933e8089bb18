//! Lock-free monotonic clock with sub-millisecond resolution.
//!
//! [`PreciseClock`] extrapolates the wall clock with the monotonic
//! `Instant` counter, which has much finer resolution than `SystemTime` on
//! most platforms. The extrapolation is re-anchored to the wall clock every
//! sync period and discarded whenever it drifts further than the allowed
//! divergence.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_timeline::time::{ClockConfig, PreciseClock};
//!
//! let clock = PreciseClock::new(ClockConfig::default());
//! let a = clock.now();
//! let b = clock.now();
//! assert!(a < b);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::time::{duration_ticks, SystemTimeSource, TimeSource, Timestamp};

/// Default wall-clock resynchronization period: 1 second.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(1);

/// Default maximal distance from the wall clock: 100 milliseconds.
pub const DEFAULT_MAX_ALLOWED_DIVERGENCE: Duration = Duration::from_millis(100);

/// Configuration for [`PreciseClock`].
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// How long the monotonic counter may run before the clock is
    /// re-anchored to the wall clock. Default: 1 second.
    pub sync_period: Duration,

    /// Maximal allowed distance between an extrapolated value and the wall
    /// clock. Larger distances fall back to the wall clock. Default: 100 ms.
    pub max_allowed_divergence: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sync_period: DEFAULT_SYNC_PERIOD,
            max_allowed_divergence: DEFAULT_MAX_ALLOWED_DIVERGENCE,
        }
    }
}

impl ClockConfig {
    /// Sets a custom sync period.
    pub fn with_sync_period(mut self, period: Duration) -> Self {
        self.sync_period = period;
        self
    }

    /// Sets a custom maximal divergence.
    pub fn with_max_allowed_divergence(mut self, divergence: Duration) -> Self {
        self.max_allowed_divergence = divergence;
        self
    }
}

/// Monotonic timestamp generator shared by any number of threads.
///
/// Every value returned by [`PreciseClock::now`] is strictly greater than
/// every value previously returned by the same instance, on any thread.
pub struct PreciseClock {
    sync_period_ticks: i64,
    max_allowed_divergence_ticks: i64,
    source: Arc<dyn TimeSource>,
    /// Fixed reference point for the monotonic counter.
    origin: Instant,
    base_ticks: AtomicI64,
    last_ticks: AtomicI64,
    /// Counter value (ticks since `origin`) at the last resync.
    counter_start_ticks: AtomicI64,
    resync: Mutex<()>,
}

impl PreciseClock {
    /// Creates a clock reading the system wall clock.
    pub fn new(config: ClockConfig) -> Self {
        Self::with_source(config, Arc::new(SystemTimeSource))
    }

    /// Creates a clock reading the given wall-clock source.
    pub fn with_source(config: ClockConfig, source: Arc<dyn TimeSource>) -> Self {
        let base = source.now_ticks();
        Self {
            sync_period_ticks: duration_ticks(config.sync_period),
            max_allowed_divergence_ticks: duration_ticks(config.max_allowed_divergence),
            source,
            origin: Instant::now(),
            base_ticks: AtomicI64::new(base),
            last_ticks: AtomicI64::new(base),
            counter_start_ticks: AtomicI64::new(0),
            resync: Mutex::new(()),
        }
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> Timestamp {
        Timestamp::from_ticks(self.now_ticks())
    }

    /// Returns the next timestamp as a raw tick count.
    ///
    /// The compare-exchange retry has no bound. It is still lock-free: a
    /// failed exchange means another caller advanced the clock.
    pub fn now_ticks(&self) -> i64 {
        let mut last = self.last_ticks.load(Ordering::Acquire);
        loop {
            let next = self.next_ticks(last);
            match self
                .last_ticks
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    /// Returns the last value handed out, without advancing the clock.
    pub fn last(&self) -> Timestamp {
        Timestamp::from_ticks(self.last_ticks.load(Ordering::Acquire))
    }

    fn counter_ticks(&self) -> i64 {
        duration_ticks(self.origin.elapsed())
    }

    fn next_ticks(&self, last: i64) -> i64 {
        let wall = self.source.now_ticks();
        let mut base = self.base_ticks.load(Ordering::Acquire);
        let mut elapsed = self.counter_ticks() - self.counter_start_ticks.load(Ordering::Acquire);

        if elapsed > self.sync_period_ticks {
            let _guard = self.resync.lock();
            let counter = self.counter_ticks();
            let start = self.counter_start_ticks.load(Ordering::Acquire);
            if counter - start > self.sync_period_ticks {
                self.base_ticks.store(wall, Ordering::Release);
                self.counter_start_ticks.store(counter, Ordering::Release);
                base = wall;
                elapsed = 0;
                trace!(base_ticks = wall, "precise clock resynchronized");
            } else {
                // Another thread resynced while we waited for the lock.
                base = self.base_ticks.load(Ordering::Acquire);
                elapsed = counter - start;
            }
        }

        let floor = last.saturating_add(1);
        let candidate = base.saturating_add(elapsed).max(floor);

        // A racing resync can pair a stale base with a fresh counter start.
        if elapsed < 0 || (candidate - wall).abs() > self.max_allowed_divergence_ticks {
            return wall.max(floor);
        }

        candidate
    }
}

impl std::fmt::Debug for PreciseClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreciseClock")
            .field("sync_period_ticks", &self.sync_period_ticks)
            .field("max_allowed_divergence_ticks", &self.max_allowed_divergence_ticks)
            .field("last_ticks", &self.last_ticks.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for PreciseClock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}
