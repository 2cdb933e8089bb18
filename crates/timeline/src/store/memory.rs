//! In-memory [`EventStore`] with linearizable conditional updates.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use super::{
    ConditionalUpdate, EventStore, EventsCollection, StoreError, UpdateOutcome,
};
use crate::series::partition::ColumnKey;
use crate::time::{TimeId, Timestamp};

#[derive(Debug, Default)]
struct PartitionRows {
    max_id: Option<TimeId>,
    rows: BTreeMap<ColumnKey, EventsCollection>,
}

#[derive(Debug, Default)]
struct StoreState {
    partitions: BTreeMap<i64, PartitionRows>,
    event_index: HashMap<Uuid, Timestamp>,
    /// Errors returned by the next conditional updates, in order.
    injected_failures: Vec<StoreError>,
    conditional_updates: u64,
}

/// Event store held entirely in memory.
///
/// Each conditional update is evaluated and applied under one lock, which
/// gives the same single-row compare-and-swap guarantee a distributed store
/// provides through its consensus round.
///
/// # Examples
/// ```rust,ignore
/// use alopex_timeline::store::{EventStore, InMemoryEventStore};
///
/// let store = InMemoryEventStore::new();
/// assert_eq!(store.max_id(0)?, None);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<StoreState>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next conditional updates fail with `errors`, one per call,
    /// before any of them is evaluated.
    pub fn fail_next_updates(&self, errors: impl IntoIterator<Item = StoreError>) {
        let mut state = self.state.lock();
        let mut errors: Vec<StoreError> = errors.into_iter().collect();
        errors.reverse();
        errors.append(&mut state.injected_failures);
        state.injected_failures = errors;
    }

    /// Number of conditional updates evaluated or failed so far.
    pub fn conditional_update_count(&self) -> u64 {
        self.state.lock().conditional_updates
    }

    /// Ids of partitions that have a `max_id`, in ascending order.
    pub fn partition_ids(&self) -> Vec<i64> {
        self.state
            .lock()
            .partitions
            .iter()
            .filter(|(_, rows)| rows.max_id.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every collection of a partition, in column order.
    pub fn collections(&self, partition_id: i64) -> Vec<EventsCollection> {
        self.state
            .lock()
            .partitions
            .get(&partition_id)
            .map(|rows| rows.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of stored collections.
    pub fn collection_count(&self) -> usize {
        self.state
            .lock()
            .partitions
            .values()
            .map(|rows| rows.rows.len())
            .sum()
    }
}

impl EventStore for InMemoryEventStore {
    fn conditional_update(
        &self,
        update: ConditionalUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.state.lock();
        state.conditional_updates += 1;
        if let Some(err) = state.injected_failures.pop() {
            return Err(err);
        }

        let StoreState {
            partitions,
            event_index,
            ..
        } = &mut *state;
        let partition = partitions.entry(update.partition_id).or_default();
        if !update.condition.holds(partition.max_id) {
            trace!(
                partition_id = update.partition_id,
                condition = ?update.condition,
                "conditional update rejected"
            );
            return Ok(UpdateOutcome::Rejected {
                current_max_id: partition.max_id,
            });
        }

        partition.max_id = Some(update.max_id);
        if let Some(row) = update.row {
            event_index.insert(row.last_event_id.to_uuid(), row.timestamp());
            partition.rows.insert(row.column_key(), row);
        }
        Ok(UpdateOutcome::Applied)
    }

    fn max_id(&self, partition_id: i64) -> Result<Option<TimeId>, StoreError> {
        Ok(self
            .state
            .lock()
            .partitions
            .get(&partition_id)
            .and_then(|rows| rows.max_id))
    }

    fn read_slice(
        &self,
        partition_id: i64,
        after: ColumnKey,
        until: ColumnKey,
        limit: usize,
    ) -> Result<Vec<EventsCollection>, StoreError> {
        if limit == 0 || after >= until {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        let Some(partition) = state.partitions.get(&partition_id) else {
            return Ok(Vec::new());
        };
        Ok(partition
            .rows
            .range((Bound::Excluded(after), Bound::Included(until)))
            .take(limit)
            .map(|(_, collection)| collection.clone())
            .collect())
    }

    fn find_event_timestamp(&self, event_id: Uuid) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.state.lock().event_index.get(&event_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Condition, Event};
    use crate::time::CLOSING_ID;

    const PARTITION: i64 = 636_000_000_000_000_000;

    fn id(offset: i64) -> TimeId {
        TimeId::min_for_timestamp(Timestamp::from_ticks(PARTITION + offset)).unwrap()
    }

    fn collection(event_id: TimeId) -> EventsCollection {
        EventsCollection {
            partition_id: PARTITION,
            last_event_id: event_id,
            events: vec![Event::new("u", &b"x"[..])],
        }
    }

    fn write(store: &InMemoryEventStore, event_id: TimeId, condition: Condition) -> UpdateOutcome {
        store
            .conditional_update(ConditionalUpdate {
                partition_id: PARTITION,
                row: Some(collection(event_id)),
                max_id: event_id,
                condition,
            })
            .unwrap()
    }

    #[test]
    fn test_first_write_requires_null() {
        let store = InMemoryEventStore::new();
        assert!(write(&store, id(1), Condition::MaxIdIsNull).is_applied());
        assert_eq!(
            write(&store, id(2), Condition::MaxIdIsNull),
            UpdateOutcome::Rejected {
                current_max_id: Some(id(1))
            }
        );
        assert_eq!(store.max_id(PARTITION).unwrap(), Some(id(1)));
        assert_eq!(store.collection_count(), 1);
    }

    #[test]
    fn test_less_than_condition() {
        let store = InMemoryEventStore::new();
        write(&store, id(5), Condition::MaxIdIsNull);
        assert!(!write(&store, id(3), Condition::MaxIdLessThan(id(3))).is_applied());
        assert!(write(&store, id(6), Condition::MaxIdLessThan(id(6))).is_applied());
        assert_eq!(store.max_id(PARTITION).unwrap(), Some(id(6)));
    }

    #[test]
    fn test_seal_without_row() {
        let store = InMemoryEventStore::new();
        write(&store, id(1), Condition::MaxIdIsNull);
        let outcome = store
            .conditional_update(ConditionalUpdate {
                partition_id: PARTITION,
                row: None,
                max_id: CLOSING_ID,
                condition: Condition::MaxIdNotEqual(CLOSING_ID),
            })
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(store.max_id(PARTITION).unwrap(), Some(CLOSING_ID));
        assert_eq!(store.collection_count(), 1);
        assert_eq!(
            write(&store, id(2), Condition::MaxIdLessThan(id(2))),
            UpdateOutcome::Rejected {
                current_max_id: Some(CLOSING_ID)
            }
        );
    }

    #[test]
    fn test_read_slice_bounds() {
        let store = InMemoryEventStore::new();
        let ids: Vec<TimeId> = (1..=5).map(id).collect();
        write(&store, ids[0], Condition::MaxIdIsNull);
        for event_id in &ids[1..] {
            write(&store, *event_id, Condition::MaxIdLessThan(*event_id));
        }

        let after = ColumnKey::for_id(ids[1]);
        let until = ColumnKey::for_id(ids[3]);
        let slice = store.read_slice(PARTITION, after, until, 10).unwrap();
        let got: Vec<TimeId> = slice.iter().map(|c| c.last_event_id).collect();
        assert_eq!(got, vec![ids[2], ids[3]]);

        let from_start = ColumnKey::end_of_tick(Timestamp::from_ticks(PARTITION));
        let limited = store.read_slice(PARTITION, from_start, until, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].last_event_id, ids[0]);

        assert!(store.read_slice(PARTITION, until, after, 10).unwrap().is_empty());
        assert!(store.read_slice(PARTITION + 1, from_start, until, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_slice_orders_ids_within_one_tick() {
        let store = InMemoryEventStore::new();
        let base = TimeId::new(Timestamp::from_ticks(PARTITION), 0, [0, 0, 0, 0, 0, 0x7e]).unwrap();
        let mut ids = vec![base];
        for _ in 0..3 {
            ids.push(ids.last().unwrap().increment().unwrap());
        }
        write(&store, ids[0], Condition::MaxIdIsNull);
        for event_id in &ids[1..] {
            assert!(write(&store, *event_id, Condition::MaxIdLessThan(*event_id)).is_applied());
        }

        let got: Vec<TimeId> = store
            .collections(PARTITION)
            .iter()
            .map(|c| c.last_event_id)
            .collect();
        assert_eq!(got, ids);

        let end = ColumnKey::end_of_tick(Timestamp::from_ticks(PARTITION));
        let after_second = store
            .read_slice(PARTITION, ColumnKey::for_id(ids[1]), end, 10)
            .unwrap();
        let got: Vec<TimeId> = after_second.iter().map(|c| c.last_event_id).collect();
        assert_eq!(got, vec![ids[2], ids[3]]);
    }

    #[test]
    fn test_event_index() {
        let store = InMemoryEventStore::new();
        write(&store, id(7), Condition::MaxIdIsNull);
        assert_eq!(
            store.find_event_timestamp(id(7).to_uuid()).unwrap(),
            Some(id(7).timestamp())
        );
        assert_eq!(store.find_event_timestamp(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_injected_failures_in_order() {
        let store = InMemoryEventStore::new();
        store.fail_next_updates([StoreError::Timeout, StoreError::Unavailable("x".into())]);
        let update = ConditionalUpdate {
            partition_id: PARTITION,
            row: None,
            max_id: id(1),
            condition: Condition::MaxIdIsNull,
        };
        assert_eq!(store.conditional_update(update.clone()), Err(StoreError::Timeout));
        assert!(matches!(
            store.conditional_update(update.clone()),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.conditional_update(update).unwrap().is_applied());
        assert_eq!(store.conditional_update_count(), 3);
        assert_eq!(store.partition_ids(), vec![PARTITION]);
    }
}
