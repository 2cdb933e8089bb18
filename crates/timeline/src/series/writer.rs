//! Optimistic-concurrency writer.
//!
//! Every partition carries a `max_id` column. A write succeeds only if it
//! raises `max_id`, so any number of writers can append to the same series
//! without coordinating beyond the store's single-row compare-and-swap.
//! When a writer moves on to a new partition it seals the partitions it
//! left behind by setting their `max_id` to [`CLOSING_ID`], which makes every
//! later write into them fail.
//!
//! ```text
//!  candidate ──▶ partition changed? ──yes──▶ seal older partitions
//!      ▲                 │                             │
//!      │                 ▼                             ▼
//!      │         IF max_id < candidate ◀───────────────┘
//!      │                 │
//!      │     ┌───────────┼──────────────┬──────────────┐
//!      │  applied     CLOSING_ID     other id        no id
//!      │     │           │              │              │
//!      │   done     jump to next    catch up to     treat partition
//!      │            partition        that id          as fresh
//!      └─────────────────┴──────────────┴──────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::{Result, TimelineError};
use crate::series::partition::Partitioner;
use crate::series::SeriesConfig;
use crate::store::{
    Condition, ConditionalUpdate, Event, EventStore, EventsCollection, StoreError, UpdateOutcome,
};
use crate::time::{PreciseClock, TimeId, Timestamp, CLOSING_ID};

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Id the events were committed with.
    pub event_id: TimeId,
    /// Timestamp assigned to each written event, in input order.
    pub timestamps: Vec<Timestamp>,
}

/// What a writer remembers between writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    last_written_partition_id: Option<i64>,
    last_written_id: Option<TimeId>,
    start_of_times: TimeId,
    start_of_times_partition_id: i64,
}

impl SyncState {
    fn new(start_of_times: TimeId, partitioner: &Partitioner) -> Self {
        Self {
            last_written_partition_id: None,
            last_written_id: None,
            start_of_times,
            start_of_times_partition_id: partitioner.partition_key(start_of_times.timestamp()),
        }
    }

    /// Partition of the last attempted write, if the writer trusts it.
    pub fn last_written_partition_id(&self) -> Option<i64> {
        self.last_written_partition_id
    }

    /// Highest id this writer knows to be taken.
    pub fn last_written_id(&self) -> Option<TimeId> {
        self.last_written_id
    }

    /// Largest id at the series start; every written id is above it.
    pub fn start_of_times(&self) -> TimeId {
        self.start_of_times
    }
}

/// Appends event batches to a series through conditional updates.
///
/// Writes take `&mut self`: one instance serves one logical writer at a time.
/// Independent instances, in this process or others, may write to the same
/// store concurrently.
///
/// # Examples
/// ```rust,ignore
/// use alopex_timeline::series::{CasWriter, SeriesConfig};
///
/// let mut writer = CasWriter::new(SeriesConfig::default(), series_start, clock, store)?;
/// let result = writer.write(&[Event::new("user-1", payload)])?;
/// ```
pub struct CasWriter {
    config: SeriesConfig,
    partitioner: Partitioner,
    clock: Arc<PreciseClock>,
    store: Arc<dyn EventStore>,
    state: SyncState,
}

impl CasWriter {
    /// Creates a writer for a series whose first valid event lies strictly
    /// after `series_start_exclusive`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unusable configuration and
    /// `InvalidFormat` if the series start is outside the time id range.
    pub fn new(
        config: SeriesConfig,
        series_start_exclusive: Timestamp,
        clock: Arc<PreciseClock>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self> {
        config.validate()?;
        let partitioner = Partitioner::new(config.partition_duration)?;
        let start_of_times = TimeId::max_for_timestamp(series_start_exclusive)?;
        Ok(Self {
            config,
            partitioner,
            clock,
            store,
            state: SyncState::new(start_of_times, &partitioner),
        })
    }

    /// Current writer state.
    pub fn sync_state(&self) -> &SyncState {
        &self.state
    }

    /// Writes `events` as one collection.
    ///
    /// Retries until the store accepts the collection or the operations
    /// timeout runs out. All events of the batch share one timestamp.
    ///
    /// # Errors
    ///
    /// - `EmptyWrite` if `events` is empty.
    /// - `OperationTimeout` if no attempt succeeded in time.
    /// - `Store` for a non-retryable store failure.
    pub fn write(&mut self, events: &[Event]) -> Result<WriteResult> {
        if events.is_empty() {
            return Err(TimelineError::EmptyWrite);
        }

        let started = Instant::now();
        while started.elapsed() < self.config.operations_timeout {
            let candidate = self.next_candidate()?;
            let partition_id = self.partitioner.partition_key(candidate.timestamp());

            let is_new_partition = self.state.last_written_partition_id != Some(partition_id);
            if is_new_partition {
                if let Err(err) = self.seal_partitions_before(partition_id) {
                    self.on_store_error(err)?;
                    continue;
                }
            }
            self.state.last_written_partition_id = Some(partition_id);

            let update = ConditionalUpdate {
                partition_id,
                row: Some(EventsCollection {
                    partition_id,
                    last_event_id: candidate,
                    events: events.to_vec(),
                }),
                max_id: candidate,
                condition: if is_new_partition {
                    Condition::MaxIdIsNull
                } else {
                    Condition::MaxIdLessThan(candidate)
                },
            };

            match self.store.conditional_update(update) {
                Ok(UpdateOutcome::Applied) => {
                    self.state.last_written_id = Some(candidate);
                    return Ok(WriteResult {
                        event_id: candidate,
                        timestamps: vec![candidate.timestamp(); events.len()],
                    });
                }
                Ok(UpdateOutcome::Rejected {
                    current_max_id: Some(max_id),
                }) if max_id == CLOSING_ID => {
                    let next = self.partitioner.next_partition_key(partition_id);
                    debug!(partition_id, next, "partition closed");
                    self.state.last_written_id = Some(TimeId::min_for_timestamp(
                        self.partitioner.partition_start(next),
                    )?);
                }
                Ok(UpdateOutcome::Rejected {
                    current_max_id: Some(max_id),
                }) => {
                    debug!(partition_id, %candidate, %max_id, "outdated id");
                    self.state.last_written_id = Some(max_id);
                }
                Ok(UpdateOutcome::Rejected {
                    current_max_id: None,
                }) => {
                    debug!(partition_id, "partition has no max id, writing it as fresh");
                    self.state.last_written_partition_id = None;
                }
                Err(err) => self.on_store_error(err)?,
            }
        }

        Err(TimelineError::OperationTimeout {
            timeout: self.config.operations_timeout,
        })
    }

    fn next_candidate(&self) -> Result<TimeId> {
        let now = self.clock.now();
        if let Some(last) = self.state.last_written_id {
            if last.timestamp() >= now {
                return last.increment();
            }
        }
        if self.state.start_of_times.timestamp() >= now {
            return self.state.start_of_times.increment();
        }
        Ok(TimeId::now(&self.clock))
    }

    /// Seals partitions below `partition_id`, newest first, down to the
    /// series start. Stops at the first partition already sealed.
    fn seal_partitions_before(&self, partition_id: i64) -> std::result::Result<(), StoreError> {
        let mut key = self.partitioner.previous_partition_key(partition_id);
        while key >= self.state.start_of_times_partition_id {
            let outcome = self.store.conditional_update(ConditionalUpdate {
                partition_id: key,
                row: None,
                max_id: CLOSING_ID,
                condition: Condition::MaxIdNotEqual(CLOSING_ID),
            })?;
            if !outcome.is_applied() {
                break;
            }
            debug!(partition_id = key, "partition sealed");

            let previous = self.partitioner.previous_partition_key(key);
            if previous == key {
                break;
            }
            key = previous;
        }
        Ok(())
    }

    fn on_store_error(&self, err: StoreError) -> Result<()> {
        if err.is_retryable() {
            warn!(error = %err, "retryable store failure, retrying write");
            Ok(())
        } else {
            error!(error = %err, "store failure, giving up write");
            Err(err.into())
        }
    }
}

impl std::fmt::Debug for CasWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasWriter")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
