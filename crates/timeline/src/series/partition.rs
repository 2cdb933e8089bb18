//! Mapping from time to partition keys and column names.
//!
//! Partition keys are tick counts truncated to the partition boundary and
//! rendered as decimal text. Column names are
//! `{ticks, 20-digit zero padded}_{event id}`; they are the stored form only.
//! Inside a partition, columns sort by [`ColumnKey`], which compares the
//! timestamp first and then the event id as a [`TimeId`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TimelineError};
use crate::time::{duration_ticks, TimeId, Timestamp};

/// Largest event id text; used as an inclusive upper bound within one tick
/// and as the "after everything at this tick" start position.
pub const MAX_EVENT_ID: Uuid = Uuid::from_bytes([0xff; 16]);

const TICKS_WIDTH: usize = 20;
const UUID_TEXT_LEN: usize = 36;

/// Exclusive read-start position: everything strictly after
/// (`timestamp`, `event_id`) in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPointer {
    /// Timestamp of the last event already seen.
    pub timestamp: Timestamp,
    /// Id of the last event already seen.
    pub event_id: Uuid,
}

impl EventPointer {
    /// Creates a pointer.
    pub fn new(timestamp: Timestamp, event_id: Uuid) -> Self {
        Self {
            timestamp,
            event_id,
        }
    }

    /// Column name of the pointed-to position.
    pub fn column_name(&self) -> String {
        column_name(self.timestamp, self.event_id)
    }

    /// Sort position of the pointed-to column.
    pub fn column_key(&self) -> ColumnKey {
        ColumnKey::new(self.timestamp, self.event_id)
    }
}

impl fmt::Display for EventPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp, self.event_id)
    }
}

/// Sort position of a column inside a partition.
///
/// Keys compare by timestamp, then by event id. An id that decodes as a
/// [`TimeId`] compares in time-id order. Any other id, [`MAX_EVENT_ID`]
/// included, sorts after every time id of the same tick, by its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    timestamp: Timestamp,
    event_id: EventIdKey,
}

// Variant order is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum EventIdKey {
    Time(TimeId),
    Other(Uuid),
}

impl ColumnKey {
    /// Creates the key of column (`timestamp`, `event_id`).
    pub fn new(timestamp: Timestamp, event_id: Uuid) -> Self {
        let event_id = match TimeId::from_uuid(event_id) {
            Ok(id) => EventIdKey::Time(id),
            Err(_) => EventIdKey::Other(event_id),
        };
        Self {
            timestamp,
            event_id,
        }
    }

    /// Key of the column an id was committed under.
    pub fn for_id(id: TimeId) -> Self {
        Self {
            timestamp: id.timestamp(),
            event_id: EventIdKey::Time(id),
        }
    }

    /// Key sorting after every column of `timestamp`.
    pub fn end_of_tick(timestamp: Timestamp) -> Self {
        Self::new(timestamp, MAX_EVENT_ID)
    }

    /// Timestamp of the column.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Event id of the column.
    pub fn event_id(&self) -> Uuid {
        match self.event_id {
            EventIdKey::Time(id) => id.to_uuid(),
            EventIdKey::Other(uuid) => uuid,
        }
    }
}

/// Builds the column name of an event.
///
/// `timestamp` must not be negative; a negative tick count has no column
/// name. Every [`TimeId`] timestamp qualifies.
pub fn column_name(timestamp: Timestamp, event_id: Uuid) -> String {
    debug_assert!(timestamp.ticks() >= 0, "negative column timestamp {timestamp}");
    format!("{:0width$}_{}", timestamp.ticks(), event_id, width = TICKS_WIDTH)
}

/// Parses a column name built by [`column_name`].
///
/// # Errors
///
/// Returns `InvalidFormat` unless the input is exactly a 20-digit tick count,
/// an underscore and a lowercase hyphenated UUID.
pub fn parse_column_name(name: &str) -> Result<(Timestamp, Uuid)> {
    let invalid = || TimelineError::InvalidFormat(format!("invalid column name {name:?}"));

    let (ticks, event_id) = name.split_once('_').ok_or_else(invalid)?;
    if ticks.len() != TICKS_WIDTH
        || !ticks.bytes().all(|b| b.is_ascii_digit())
        || event_id.len() != UUID_TEXT_LEN
    {
        return Err(invalid());
    }
    let ticks: i64 = ticks.parse().map_err(|_| invalid())?;
    let event_id = Uuid::parse_str(event_id).map_err(|_| invalid())?;
    let timestamp = Timestamp::from_ticks(ticks);

    if column_name(timestamp, event_id) != name {
        return Err(invalid());
    }
    Ok((timestamp, event_id))
}

/// Renders a partition key as stored.
pub fn format_partition_key(partition_id: i64) -> String {
    partition_id.to_string()
}

/// Parses a stored partition key.
pub fn parse_partition_key(key: &str) -> Result<i64> {
    key.parse()
        .map_err(|_| TimelineError::InvalidFormat(format!("invalid partition key {key:?}")))
}

/// Splits time into fixed-width partitions.
///
/// # Examples
/// ```rust,ignore
/// use alopex_timeline::series::Partitioner;
/// use std::time::Duration;
///
/// let partitioner = Partitioner::new(Duration::from_secs(60))?;
/// let key = partitioner.partition_key(timestamp);
/// let next = partitioner.next_partition_key(key);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    duration_ticks: i64,
}

impl Partitioner {
    /// Creates a partitioner.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `duration` is shorter than one tick.
    pub fn new(duration: Duration) -> Result<Self> {
        let duration_ticks = duration_ticks(duration);
        if duration_ticks <= 0 {
            return Err(TimelineError::InvalidConfig(format!(
                "partition duration {duration:?} is shorter than one tick"
            )));
        }
        Ok(Self { duration_ticks })
    }

    /// Partition width in ticks.
    pub fn duration_ticks(&self) -> i64 {
        self.duration_ticks
    }

    /// Key of the partition containing `timestamp`.
    pub fn partition_key(&self, timestamp: Timestamp) -> i64 {
        let ticks = timestamp.ticks();
        ticks - ticks.rem_euclid(self.duration_ticks)
    }

    /// Key of the partition following `key`.
    pub fn next_partition_key(&self, key: i64) -> i64 {
        key.saturating_add(self.duration_ticks)
    }

    /// Key of the partition preceding `key`.
    pub fn previous_partition_key(&self, key: i64) -> i64 {
        key.saturating_sub(self.duration_ticks)
    }

    /// First timestamp of the partition `key`.
    pub fn partition_start(&self, key: i64) -> Timestamp {
        Timestamp::from_ticks(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TICKS_PER_SECOND;

    fn minute() -> Partitioner {
        Partitioner::new(Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_partition_key_truncates() {
        let p = minute();
        let d = 60 * TICKS_PER_SECOND;
        assert_eq!(p.partition_key(Timestamp::from_ticks(0)), 0);
        assert_eq!(p.partition_key(Timestamp::from_ticks(d - 1)), 0);
        assert_eq!(p.partition_key(Timestamp::from_ticks(d)), d);
        assert_eq!(p.partition_key(Timestamp::from_ticks(5 * d + 17)), 5 * d);
    }

    #[test]
    fn test_partition_key_negative_floors() {
        let p = minute();
        let d = 60 * TICKS_PER_SECOND;
        assert_eq!(p.partition_key(Timestamp::from_ticks(-1)), -d);
        assert_eq!(p.partition_key(Timestamp::from_ticks(-d)), -d);
    }

    #[test]
    fn test_next_and_previous() {
        let p = minute();
        let key = p.partition_key(Timestamp::now());
        let next = p.next_partition_key(key);
        assert_eq!(next - key, p.duration_ticks());
        assert_eq!(p.partition_key(Timestamp::from_ticks(next)), next);
        assert_eq!(p.previous_partition_key(next), key);
        assert_eq!(p.partition_start(key).ticks(), key);
    }

    #[test]
    fn test_partitioner_rejects_zero() {
        assert!(matches!(
            Partitioner::new(Duration::ZERO),
            Err(TimelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_column_name_format() {
        let id = Uuid::parse_str("8b0a3c1e-4f5d-11e5-8c4e-808080808080").unwrap();
        let name = column_name(Timestamp::from_ticks(635_700_000_000_000_123), id);
        assert_eq!(name, "00635700000000000123_8b0a3c1e-4f5d-11e5-8c4e-808080808080");
        assert_eq!(
            parse_column_name(&name).unwrap(),
            (Timestamp::from_ticks(635_700_000_000_000_123), id)
        );
    }

    #[test]
    fn test_column_name_orders_by_time() {
        let a = column_name(Timestamp::from_ticks(9), MAX_EVENT_ID);
        let b = column_name(Timestamp::from_ticks(10), Uuid::nil());
        assert!(a < b);
    }

    #[test]
    fn test_parse_column_name_rejects_malformed() {
        let id = "8b0a3c1e-4f5d-11e5-8c4e-808080808080";
        for bad in [
            "",
            "_",
            "00635700000000000123",
            "635700000000000123_8b0a3c1e-4f5d-11e5-8c4e-808080808080",
            "00635700000000000123-8b0a3c1e-4f5d-11e5-8c4e-808080808080",
            "0063570000000000012x_8b0a3c1e-4f5d-11e5-8c4e-808080808080",
            "00635700000000000123_8B0A3C1E-4F5D-11E5-8C4E-808080808080",
            "00635700000000000123_8b0a3c1e4f5d11e58c4e808080808080",
            "00635700000000000123_not-a-uuid-at-all-but-36-chars-long!",
        ] {
            assert!(parse_column_name(bad).is_err(), "{bad}");
        }
        assert!(parse_column_name(&format!("00635700000000000123_{id}")).is_ok());
    }

    #[test]
    fn test_column_name_covers_time_id_range() {
        use crate::time::time_id::{GREGORIAN_CALENDAR_END, GREGORIAN_CALENDAR_START};

        let mut names = Vec::new();
        for timestamp in [GREGORIAN_CALENDAR_START, GREGORIAN_CALENDAR_END] {
            let id = TimeId::max_for_timestamp(timestamp).unwrap();
            let name = column_name(timestamp, id.to_uuid());
            assert_eq!(name.split_once('_').unwrap().0.len(), 20);
            assert_eq!(parse_column_name(&name).unwrap(), (timestamp, id.to_uuid()));
            names.push(name);
        }
        assert!(names[0] < names[1]);
    }

    #[test]
    fn test_parse_column_name_rejects_negative_ticks() {
        let id = "8b0a3c1e-4f5d-11e5-8c4e-808080808080";
        assert!(parse_column_name(&format!("-0000000000000000001_{id}")).is_err());
    }

    #[test]
    fn test_column_key_follows_time_id_order() {
        let ts = Timestamp::from_ticks(636_000_000_000_000_000);
        let below = TimeId::new(ts, 0, [0, 0, 0, 0, 0, 0x7f]).unwrap();
        let above = below.increment().unwrap();
        assert!(below < above);
        // The sign-flipped node byte reverses text order across 0x7f/0x80.
        assert!(below.to_uuid().to_string() > above.to_uuid().to_string());

        let below_key = ColumnKey::new(ts, below.to_uuid());
        let above_key = ColumnKey::new(ts, above.to_uuid());
        assert!(below_key < above_key);
        assert_eq!(above_key, ColumnKey::for_id(above));
        assert_eq!(above_key.event_id(), above.to_uuid());
    }

    #[test]
    fn test_column_key_end_of_tick() {
        let ts = Timestamp::from_ticks(636_000_000_000_000_000);
        let end = ColumnKey::end_of_tick(ts);
        let last = TimeId::max_for_timestamp(ts).unwrap();
        let next = TimeId::min_for_timestamp(Timestamp::from_ticks(ts.ticks() + 1)).unwrap();
        assert!(ColumnKey::for_id(last) < end);
        assert!(ColumnKey::new(ts, Uuid::new_v4()) < end);
        assert!(end < ColumnKey::for_id(next));
        assert_eq!(end.timestamp(), ts);
        assert_eq!(end.event_id(), MAX_EVENT_ID);
    }

    #[test]
    fn test_partition_key_text() {
        assert_eq!(format_partition_key(635_700_000_000_000_000), "635700000000000000");
        assert_eq!(parse_partition_key("635700000000000000").unwrap(), 635_700_000_000_000_000);
        assert!(parse_partition_key("abc").is_err());
        assert!(parse_partition_key("").is_err());
    }

    #[test]
    fn test_max_event_id_text() {
        assert_eq!(MAX_EVENT_ID.to_string(), "ffffffff-ffff-ffff-ffff-ffffffffffff");
    }

    #[test]
    fn test_pointer_column_name() {
        let pointer = EventPointer::new(Timestamp::from_ticks(42), MAX_EVENT_ID);
        assert_eq!(
            pointer.column_name(),
            "00000000000000000042_ffffffff-ffff-ffff-ffff-ffffffffffff"
        );
    }
}
