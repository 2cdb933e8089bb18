//! Reads resolved ranges partition by partition.

use std::sync::Arc;

use crate::error::Result;
use crate::series::partition::ColumnKey;
use crate::series::range::EventSeriesRange;
use crate::store::{EventStore, EventsCollection};

/// Reads the collections inside an [`EventSeriesRange`].
pub struct EventReader {
    store: Arc<dyn EventStore>,
}

impl EventReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Reads up to `limit` collections strictly after the range start and at
    /// or before its end timestamp, in column order.
    ///
    /// To continue a truncated read, resolve a new range from the last
    /// collection's [`EventsCollection::pointer`] or call
    /// [`EventSeriesRange::resume_from`].
    pub fn read(&self, range: &EventSeriesRange, limit: usize) -> Result<Vec<EventsCollection>> {
        let partitioner = range.partitioner()?;
        let after = range.start().column_key();
        let until = ColumnKey::end_of_tick(range.end_timestamp);
        let end_key = partitioner.partition_key(range.end_timestamp);

        let mut collections = Vec::new();
        let mut key = partitioner.partition_key(range.start_timestamp);
        while key <= end_key && collections.len() < limit {
            let slice = self
                .store
                .read_slice(key, after, until, limit - collections.len())?;
            collections.extend(slice);

            let next = partitioner.next_partition_key(key);
            if next == key {
                break;
            }
            key = next;
        }
        Ok(collections)
    }
}

impl std::fmt::Debug for EventReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReader").finish_non_exhaustive()
    }
}
