//! Event series: partitioning, the compare-and-swap writer, range
//! resolution and reading.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   candidate ids   ┌──────────────┐  conditional update  ┌────────────┐
//! │ PreciseClock │ ────────────────▶ │  CasWriter   │ ───────────────────▶ │ EventStore │
//! └──────────────┘                   └──────────────┘                      └────────────┘
//!                                                                                ▲
//! ┌──────────────┐   EventSeriesRange ┌──────────────┐     column slices         │
//! │RangeResolver │ ─────────────────▶ │ EventReader  │ ──────────────────────────┘
//! └──────────────┘                    └──────────────┘
//! ```

pub mod event_series;
pub mod partition;
pub mod range;
pub mod reader;
pub mod writer;

pub use event_series::EventSeries;
pub use partition::{ColumnKey, EventPointer, Partitioner, MAX_EVENT_ID};
pub use range::{EventSeriesRange, RangeOutcome, RangeResolver, RangeStart};
pub use reader::EventReader;
pub use writer::{CasWriter, SyncState, WriteResult};

use std::time::Duration;

use crate::error::{Result, TimelineError};
use crate::time::duration_ticks;

/// Default partition duration: 1 minute.
pub const DEFAULT_PARTITION_DURATION: Duration = Duration::from_secs(60);

/// Default writer retry budget: 10 seconds.
pub const DEFAULT_OPERATIONS_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by every component of one series.
#[derive(Debug, Clone)]
pub struct SeriesConfig {
    /// Width of one time partition. Default: 1 minute.
    pub partition_duration: Duration,

    /// How long a write keeps retrying before it fails. Default: 10 seconds.
    pub operations_timeout: Duration,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            partition_duration: DEFAULT_PARTITION_DURATION,
            operations_timeout: DEFAULT_OPERATIONS_TIMEOUT,
        }
    }
}

impl SeriesConfig {
    /// Sets a custom partition duration.
    pub fn with_partition_duration(mut self, duration: Duration) -> Self {
        self.partition_duration = duration;
        self
    }

    /// Sets a custom operations timeout.
    pub fn with_operations_timeout(mut self, timeout: Duration) -> Self {
        self.operations_timeout = timeout;
        self
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the partition duration is shorter than one
    /// tick or the operations timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if duration_ticks(self.partition_duration) <= 0 {
            return Err(TimelineError::InvalidConfig(format!(
                "partition duration {:?} is shorter than one tick",
                self.partition_duration
            )));
        }
        if self.operations_timeout.is_zero() {
            return Err(TimelineError::InvalidConfig(
                "operations timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_config_default() {
        let config = SeriesConfig::default();
        assert_eq!(config.partition_duration, Duration::from_secs(60));
        assert_eq!(config.operations_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_series_config_validate() {
        let zero_partition = SeriesConfig::default().with_partition_duration(Duration::from_nanos(99));
        assert!(matches!(
            zero_partition.validate(),
            Err(TimelineError::InvalidConfig(_))
        ));

        let zero_timeout = SeriesConfig::default().with_operations_timeout(Duration::ZERO);
        assert!(matches!(
            zero_timeout.validate(),
            Err(TimelineError::InvalidConfig(_))
        ));
    }
}
