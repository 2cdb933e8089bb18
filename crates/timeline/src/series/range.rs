//! Resolution of read requests into well-formed query windows.
//!
//! A read request names where to start (nothing, a timestamp, a pointer from
//! a previous read, or a bare event id) and optionally where to end. The
//! resolver fills the gaps from the series watermarks and either produces an
//! [`EventSeriesRange`] or reports why there is nothing to read.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::series::partition::{EventPointer, Partitioner, MAX_EVENT_ID};
use crate::store::{EventStore, Watermarks};
use crate::time::Timestamp;

/// Where a read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStart {
    /// From the beginning of the series.
    None,
    /// After every event at or before the timestamp.
    Timestamp(Timestamp),
    /// Strictly after the pointed-to event.
    Pointer(EventPointer),
    /// Strictly after the event with this id, looked up in the store.
    EventId(Uuid),
}

impl From<EventPointer> for RangeStart {
    fn from(pointer: EventPointer) -> Self {
        RangeStart::Pointer(pointer)
    }
}

impl From<Timestamp> for RangeStart {
    fn from(timestamp: Timestamp) -> Self {
        RangeStart::Timestamp(timestamp)
    }
}

/// Resolved read window: `(start, start_event_id)` exclusive,
/// `end_timestamp` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSeriesRange {
    /// Timestamp of the exclusive start position.
    pub start_timestamp: Timestamp,
    /// Event id of the exclusive start position.
    pub start_event_id: Uuid,
    /// Inclusive end timestamp.
    pub end_timestamp: Timestamp,
    /// Partition width of the series.
    pub partition_duration: Duration,
}

impl EventSeriesRange {
    /// Exclusive start position.
    pub fn start(&self) -> EventPointer {
        EventPointer::new(self.start_timestamp, self.start_event_id)
    }

    /// Same range continuing after `pointer`.
    pub fn resume_from(&self, pointer: EventPointer) -> Self {
        Self {
            start_timestamp: pointer.timestamp,
            start_event_id: pointer.event_id,
            ..*self
        }
    }

    /// Partitioner for this range's partition width.
    pub fn partitioner(&self) -> Result<Partitioner> {
        Partitioner::new(self.partition_duration)
    }
}

/// Result of resolving a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// A readable window.
    Range(EventSeriesRange),
    /// Nothing to read: a required watermark is unset or the end lies before
    /// the start.
    NoRange,
    /// The start event id is not in the store.
    StartNotFound,
}

impl RangeOutcome {
    /// Returns the range, if any.
    pub fn range(self) -> Option<EventSeriesRange> {
        match self {
            RangeOutcome::Range(range) => Some(range),
            _ => None,
        }
    }
}

/// Turns [`RangeStart`] plus an optional end into an [`RangeOutcome`].
pub struct RangeResolver {
    partition_duration: Duration,
    store: Arc<dyn EventStore>,
    watermarks: Arc<dyn Watermarks>,
}

impl RangeResolver {
    /// Creates a resolver.
    pub fn new(
        partition_duration: Duration,
        store: Arc<dyn EventStore>,
        watermarks: Arc<dyn Watermarks>,
    ) -> Self {
        Self {
            partition_duration,
            store,
            watermarks,
        }
    }

    /// Resolves a read request. `end` is inclusive.
    ///
    /// # Errors
    ///
    /// Propagates failures reading the watermarks or the event-id lookup.
    pub fn resolve(&self, start: RangeStart, end: Option<Timestamp>) -> Result<RangeOutcome> {
        let Some(start) = self.effective_start(start)? else {
            return Ok(RangeOutcome::NoRange);
        };
        let start = match start {
            Resolved::Found(pointer) => pointer,
            Resolved::NotFound(event_id) => {
                debug!(%event_id, "range start event not found");
                return Ok(RangeOutcome::StartNotFound);
            }
        };

        let end = match end {
            Some(end) => end,
            None => match self.watermarks.last_good_event()? {
                Some(end) => end,
                None => return Ok(RangeOutcome::NoRange),
            },
        };

        if end < start.timestamp {
            return Ok(RangeOutcome::NoRange);
        }

        Ok(RangeOutcome::Range(EventSeriesRange {
            start_timestamp: start.timestamp,
            start_event_id: start.event_id,
            end_timestamp: end,
            partition_duration: self.partition_duration,
        }))
    }

    fn effective_start(&self, start: RangeStart) -> Result<Option<Resolved>> {
        match start {
            RangeStart::None => Ok(self
                .watermarks
                .series_start_exclusive()?
                .map(|series_start| Resolved::Found(EventPointer::new(series_start, MAX_EVENT_ID)))),
            RangeStart::Timestamp(timestamp) => Ok(self
                .watermarks
                .series_start_exclusive()?
                .map(|series_start| {
                    Resolved::Found(EventPointer::new(timestamp.max(series_start), MAX_EVENT_ID))
                })),
            RangeStart::Pointer(pointer) => Ok(Some(Resolved::Found(pointer))),
            RangeStart::EventId(event_id) => {
                Ok(Some(match self.store.find_event_timestamp(event_id)? {
                    Some(timestamp) => Resolved::Found(EventPointer::new(timestamp, event_id)),
                    None => Resolved::NotFound(event_id),
                }))
            }
        }
    }
}

impl std::fmt::Debug for RangeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeResolver")
            .field("partition_duration", &self.partition_duration)
            .finish_non_exhaustive()
    }
}

enum Resolved {
    Found(EventPointer),
    NotFound(Uuid),
}
