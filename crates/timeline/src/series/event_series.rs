//! One event series: a shared writer, range resolution and reads.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, TimelineError};
use crate::series::range::{EventSeriesRange, RangeOutcome, RangeResolver, RangeStart};
use crate::series::reader::EventReader;
use crate::series::writer::{CasWriter, WriteResult};
use crate::series::SeriesConfig;
use crate::store::{Event, EventStore, EventsCollection, Watermarks};
use crate::time::{PreciseClock, Timestamp};

/// Entry point for writing to and reading from one series.
///
/// Writes from any number of threads are serialized through one
/// [`CasWriter`]. Every successful write advances `last_good_event`.
///
/// # Examples
/// ```rust,ignore
/// use alopex_timeline::{EventSeries, SeriesConfig, Event, RangeStart};
///
/// let series = EventSeries::open(SeriesConfig::default(), store, watermarks, clock)?;
/// series.write(&[Event::new("user-1", payload)])?;
/// if let RangeOutcome::Range(range) = series.resolve_range(RangeStart::None, None)? {
///     let collections = series.read(&range, 1000)?;
/// }
/// ```
pub struct EventSeries {
    config: SeriesConfig,
    writer: Mutex<CasWriter>,
    resolver: RangeResolver,
    reader: EventReader,
    watermarks: Arc<dyn Watermarks>,
}

impl EventSeries {
    /// Opens a series.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is unusable or the
    /// series start watermark is not set.
    pub fn open(
        config: SeriesConfig,
        store: Arc<dyn EventStore>,
        watermarks: Arc<dyn Watermarks>,
        clock: Arc<PreciseClock>,
    ) -> Result<Self> {
        config.validate()?;
        let series_start = watermarks.series_start_exclusive()?.ok_or_else(|| {
            TimelineError::InvalidConfig("series start watermark is not set".to_string())
        })?;

        let writer = CasWriter::new(config.clone(), series_start, clock, Arc::clone(&store))?;
        let resolver = RangeResolver::new(
            config.partition_duration,
            Arc::clone(&store),
            Arc::clone(&watermarks),
        );
        debug!(series_start = %series_start, "event series opened");

        Ok(Self {
            config,
            writer: Mutex::new(writer),
            resolver,
            reader: EventReader::new(store),
            watermarks,
        })
    }

    /// Series configuration.
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Writes `events` as one collection and advances `last_good_event` to
    /// its timestamp.
    pub fn write(&self, events: &[Event]) -> Result<WriteResult> {
        let result = self.writer.lock().write(events)?;
        self.watermarks
            .advance_last_good_event(result.event_id.timestamp())?;
        Ok(result)
    }

    /// Resolves a read request. See [`RangeResolver::resolve`].
    pub fn resolve_range(&self, start: RangeStart, end: Option<Timestamp>) -> Result<RangeOutcome> {
        self.resolver.resolve(start, end)
    }

    /// Reads up to `limit` collections of a resolved range.
    pub fn read(&self, range: &EventSeriesRange, limit: usize) -> Result<Vec<EventsCollection>> {
        self.reader.read(range, limit)
    }

    /// The series watermarks.
    pub fn watermarks(&self) -> &Arc<dyn Watermarks> {
        &self.watermarks
    }
}

impl std::fmt::Debug for EventSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSeries")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryEventStore, InMemoryWatermarks};

    #[test]
    fn test_open_requires_series_start() {
        let result = EventSeries::open(
            SeriesConfig::default(),
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryWatermarks::new()),
            Arc::new(PreciseClock::default()),
        );
        assert!(matches!(result, Err(TimelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_write_advances_last_good_event() {
        let marks = Arc::new(InMemoryWatermarks::with_series_start(
            Timestamp::now().add_ticks(-1),
        ));
        let series = EventSeries::open(
            SeriesConfig::default(),
            Arc::new(InMemoryEventStore::new()),
            marks.clone(),
            Arc::new(PreciseClock::default()),
        )
        .unwrap();

        let result = series.write(&[Event::new("u", &b"a"[..])]).unwrap();
        assert_eq!(
            marks.last_good_event().unwrap(),
            Some(result.event_id.timestamp())
        );
    }
}
