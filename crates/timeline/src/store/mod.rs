//! Backing-store contract for event series.
//!
//! The series logic needs exactly one primitive from storage: a single-row
//! conditional update on a partition's `max_id` column that, when applied,
//! also inserts one events collection. Everything else is plain reads.
//!
//! [`memory::InMemoryEventStore`] implements the contract for tests and local
//! embedding. Drivers for real distributed stores implement [`EventStore`]
//! outside this crate.

pub mod memory;
pub mod watermark;

pub use memory::InMemoryEventStore;
pub use watermark::{InMemoryWatermarks, Watermarks};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::series::partition::{column_name, ColumnKey, EventPointer};
use crate::time::{TimeId, Timestamp};

/// A single user event. The payload is opaque to the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier of the user that produced the event.
    pub user_id: String,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl Event {
    /// Creates an event.
    pub fn new(user_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            user_id: user_id.into(),
            payload: payload.into(),
        }
    }
}

/// The unit committed by one conditional write: a batch of events stored
/// under one column of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsCollection {
    /// Partition the collection belongs to.
    pub partition_id: i64,
    /// Id the collection was committed with.
    pub last_event_id: TimeId,
    /// Events in write order.
    pub events: Vec<Event>,
}

impl EventsCollection {
    /// Timestamp shared by every event of the collection.
    pub fn timestamp(&self) -> Timestamp {
        self.last_event_id.timestamp()
    }

    /// Column under which the collection is stored.
    pub fn column_name(&self) -> String {
        column_name(self.timestamp(), self.last_event_id.to_uuid())
    }

    /// Sort position of the collection inside its partition.
    pub fn column_key(&self) -> ColumnKey {
        ColumnKey::for_id(self.last_event_id)
    }

    /// Exclusive position right after this collection.
    pub fn pointer(&self) -> EventPointer {
        EventPointer::new(self.timestamp(), self.last_event_id.to_uuid())
    }
}

/// Predicate on a partition's current `max_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `max_id` was never written.
    MaxIdIsNull,
    /// `max_id` is set and strictly less than the given id.
    MaxIdLessThan(TimeId),
    /// `max_id` is unset or differs from the given id.
    MaxIdNotEqual(TimeId),
}

impl Condition {
    /// Evaluates the predicate against a current `max_id`.
    pub fn holds(&self, current: Option<TimeId>) -> bool {
        match self {
            Condition::MaxIdIsNull => current.is_none(),
            Condition::MaxIdLessThan(id) => matches!(current, Some(max_id) if max_id < *id),
            Condition::MaxIdNotEqual(id) => current != Some(*id),
        }
    }
}

/// One single-row conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalUpdate {
    /// Target partition.
    pub partition_id: i64,
    /// Collection to insert when applied. `None` updates `max_id` only.
    pub row: Option<EventsCollection>,
    /// New `max_id` when applied.
    pub max_id: TimeId,
    /// Predicate that must hold for the update to apply.
    pub condition: Condition,
}

/// Result of a conditional update the store accepted for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The condition held and the update is durable.
    Applied,
    /// The condition failed. Carries the `max_id` the store saw.
    Rejected {
        /// `max_id` at evaluation time, `None` if never written.
        current_max_id: Option<TimeId>,
    },
}

impl UpdateOutcome {
    /// Returns true if the update was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

/// Failure talking to the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Not enough replicas or the node is unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time. The update may or may not have
    /// been applied.
    #[error("Store request timed out")]
    Timeout,

    /// The store refused the request outright.
    #[error("Store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout)
    }
}

/// Row store offering single-row compare-and-swap.
pub trait EventStore: Send + Sync {
    /// Atomically evaluates `update.condition` against the partition's
    /// `max_id` and, if it holds, sets `max_id` and inserts the row.
    fn conditional_update(
        &self,
        update: ConditionalUpdate,
    ) -> std::result::Result<UpdateOutcome, StoreError>;

    /// Reads a partition's `max_id`.
    fn max_id(&self, partition_id: i64) -> std::result::Result<Option<TimeId>, StoreError>;

    /// Reads collections of one partition whose column key lies in
    /// `(after, until]`, in [`ColumnKey`] order, at most `limit` of them.
    ///
    /// Stores that compare columns as raw text must translate the bounds:
    /// within one tick, UUID text order is not time-id order.
    fn read_slice(
        &self,
        partition_id: i64,
        after: ColumnKey,
        until: ColumnKey,
        limit: usize,
    ) -> std::result::Result<Vec<EventsCollection>, StoreError>;

    /// Looks up the timestamp of the collection committed with `event_id`.
    fn find_event_timestamp(
        &self,
        event_id: Uuid,
    ) -> std::result::Result<Option<Timestamp>, StoreError>;
}
