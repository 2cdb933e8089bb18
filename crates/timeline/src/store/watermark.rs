//! Series watermarks: `series_start_exclusive` and `last_good_event`.

use parking_lot::RwLock;

use super::StoreError;
use crate::time::Timestamp;

/// Accessor for the two externally owned series watermarks.
///
/// Values are read fresh on every range resolution. Implementations backed by
/// a remote store may fail with a [`StoreError`].
pub trait Watermarks: Send + Sync {
    /// Exclusive lower bound of the whole series.
    fn series_start_exclusive(&self) -> Result<Option<Timestamp>, StoreError>;

    /// Sets the exclusive lower bound of the whole series.
    fn set_series_start_exclusive(&self, timestamp: Timestamp) -> Result<(), StoreError>;

    /// Highest timestamp known to be durable.
    fn last_good_event(&self) -> Result<Option<Timestamp>, StoreError>;

    /// Sets the highest durable timestamp.
    fn set_last_good_event(&self, timestamp: Timestamp) -> Result<(), StoreError>;

    /// Moves `last_good_event` forward to `timestamp` unless it is already at
    /// or beyond it. Returns true if the value changed.
    fn advance_last_good_event(&self, timestamp: Timestamp) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Values {
    series_start_exclusive: Option<Timestamp>,
    last_good_event: Option<Timestamp>,
}

/// Watermarks held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWatermarks {
    values: RwLock<Values>,
}

impl InMemoryWatermarks {
    /// Creates watermarks with both values unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates watermarks with the series start set.
    pub fn with_series_start(series_start_exclusive: Timestamp) -> Self {
        Self {
            values: RwLock::new(Values {
                series_start_exclusive: Some(series_start_exclusive),
                last_good_event: None,
            }),
        }
    }
}

impl Watermarks for InMemoryWatermarks {
    fn series_start_exclusive(&self) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.values.read().series_start_exclusive)
    }

    fn set_series_start_exclusive(&self, timestamp: Timestamp) -> Result<(), StoreError> {
        self.values.write().series_start_exclusive = Some(timestamp);
        Ok(())
    }

    fn last_good_event(&self) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.values.read().last_good_event)
    }

    fn set_last_good_event(&self, timestamp: Timestamp) -> Result<(), StoreError> {
        self.values.write().last_good_event = Some(timestamp);
        Ok(())
    }

    fn advance_last_good_event(&self, timestamp: Timestamp) -> Result<bool, StoreError> {
        let mut values = self.values.write();
        if values.last_good_event >= Some(timestamp) {
            return Ok(false);
        }
        values.last_good_event = Some(timestamp);
        Ok(true)
    }
}
