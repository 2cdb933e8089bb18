//! 128-bit time-ordered identifiers.
//!
//! A [`TimeId`] is a version 1 (time-based) UUID whose logical order is
//! (timestamp, clock sequence, node). The byte layout keeps the RFC 4122 field
//! order with two adjustments for stores that compare the trailing eight
//! bytes as signed values:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬───────────────┬──────────┬────────────┐
//! │ time_low │ time_mid │ ver|time_hi  │ var|clkseq_hi │ clkseq_lo│ node (6)   │
//! │  4 bytes │  2 bytes │   2 bytes    │    1 byte     │ ^ 0x80   │ each ^ 0x80│
//! └──────────┴──────────┴──────────────┴───────────────┴──────────┴────────────┘
//! ```
//!
//! The 60-bit timestamp counts ticks since the Gregorian calendar start
//! (1582-10-15).

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Result, TimelineError};
use crate::time::{PreciseClock, Timestamp};

/// Size of an encoded time id in bytes.
pub const TIME_ID_SIZE: usize = 16;

/// Tick count of 1582-10-15T00:00:00Z, the zero point of time id timestamps.
pub const GREGORIAN_CALENDAR_START: Timestamp = Timestamp::from_ticks(499_163_040_000_000_000);

/// Largest timestamp offset representable in 60 bits.
pub const MAX_TIMESTAMP_OFFSET: u64 = (1 << 60) - 1;

/// Last timestamp representable by a time id.
pub const GREGORIAN_CALENDAR_END: Timestamp =
    Timestamp::from_ticks(GREGORIAN_CALENDAR_START.ticks() + MAX_TIMESTAMP_OFFSET as i64);

/// Smallest clock sequence.
pub const MIN_CLOCK_SEQUENCE: u16 = 0;

/// Largest clock sequence (14 bits).
pub const MAX_CLOCK_SEQUENCE: u16 = 0x3fff;

/// Smallest node.
pub const MIN_NODE: [u8; 6] = [0x00; 6];

/// Largest node.
pub const MAX_NODE: [u8; 6] = [0xff; 6];

/// Reserved id marking a partition as sealed.
pub const CLOSING_ID: TimeId = TimeId::MAX;

const VERSION: u8 = 1;
const VARIANT_BITS: u8 = 0x80;
const VARIANT_MASK: u8 = 0xc0;
const SIGN_FLIP: u8 = 0x80;
const NODE_MASK: u64 = (1 << 48) - 1;

/// Time-based identifier with a strict total order.
///
/// Field order matters: the derived ordering compares the timestamp offset,
/// then the clock sequence, then the node bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeId {
    offset: u64,
    clock_sequence: u16,
    node: [u8; 6],
}

impl TimeId {
    /// Smallest time id: Gregorian start, minimal clock sequence and node.
    pub const MIN: TimeId = TimeId {
        offset: 0,
        clock_sequence: MIN_CLOCK_SEQUENCE,
        node: MIN_NODE,
    };

    /// Largest time id: Gregorian end, maximal clock sequence and node.
    pub const MAX: TimeId = TimeId {
        offset: MAX_TIMESTAMP_OFFSET,
        clock_sequence: MAX_CLOCK_SEQUENCE,
        node: MAX_NODE,
    };

    /// Builds a time id from its fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the timestamp lies outside
    /// [`GREGORIAN_CALENDAR_START`]..=[`GREGORIAN_CALENDAR_END`] or the clock
    /// sequence does not fit in 14 bits.
    pub fn new(timestamp: Timestamp, clock_sequence: u16, node: [u8; 6]) -> Result<Self> {
        if clock_sequence > MAX_CLOCK_SEQUENCE {
            return Err(TimelineError::InvalidFormat(format!(
                "clock sequence {clock_sequence} exceeds {MAX_CLOCK_SEQUENCE}"
            )));
        }
        Ok(Self {
            offset: timestamp_offset(timestamp)?,
            clock_sequence,
            node,
        })
    }

    /// Smallest time id with the given timestamp.
    pub fn min_for_timestamp(timestamp: Timestamp) -> Result<Self> {
        Self::new(timestamp, MIN_CLOCK_SEQUENCE, MIN_NODE)
    }

    /// Largest time id with the given timestamp.
    pub fn max_for_timestamp(timestamp: Timestamp) -> Result<Self> {
        Self::new(timestamp, MAX_CLOCK_SEQUENCE, MAX_NODE)
    }

    /// Mints a time id for the clock's next timestamp with a random clock
    /// sequence and node.
    pub fn now(clock: &PreciseClock) -> Self {
        let offset = clock
            .now()
            .ticks()
            .saturating_sub(GREGORIAN_CALENDAR_START.ticks())
            .clamp(0, MAX_TIMESTAMP_OFFSET as i64) as u64;
        Self {
            offset,
            clock_sequence: rand::random::<u16>() & MAX_CLOCK_SEQUENCE,
            node: rand::random(),
        }
    }

    /// Returns the timestamp.
    pub fn timestamp(&self) -> Timestamp {
        GREGORIAN_CALENDAR_START.add_ticks(self.offset as i64)
    }

    /// Returns the clock sequence.
    pub fn clock_sequence(&self) -> u16 {
        self.clock_sequence
    }

    /// Returns the node.
    pub fn node(&self) -> [u8; 6] {
        self.node
    }

    /// Returns the next time id in order.
    ///
    /// The (clock sequence, node) pair is incremented as one 62-bit counter;
    /// when it overflows the timestamp moves forward by one tick and the pair
    /// restarts from its minimum.
    ///
    /// # Errors
    ///
    /// Returns `IdOverflow` for [`TimeId::MAX`].
    pub fn increment(&self) -> Result<Self> {
        let node = node_to_u64(&self.node);
        if node < NODE_MASK {
            return Ok(Self {
                node: node_from_u64(node + 1),
                ..*self
            });
        }
        if self.clock_sequence < MAX_CLOCK_SEQUENCE {
            return Ok(Self {
                clock_sequence: self.clock_sequence + 1,
                node: MIN_NODE,
                ..*self
            });
        }
        if self.offset < MAX_TIMESTAMP_OFFSET {
            return Ok(Self {
                offset: self.offset + 1,
                clock_sequence: MIN_CLOCK_SEQUENCE,
                node: MIN_NODE,
            });
        }
        Err(TimelineError::IdOverflow)
    }

    /// Encodes the id into its 16-byte representation.
    pub fn to_bytes(&self) -> [u8; TIME_ID_SIZE] {
        let mut bytes = [0u8; TIME_ID_SIZE];
        let time_low = (self.offset & 0xffff_ffff) as u32;
        let time_mid = ((self.offset >> 32) & 0xffff) as u16;
        let time_hi = ((self.offset >> 48) & 0x0fff) as u16 | ((VERSION as u16) << 12);
        bytes[0..4].copy_from_slice(&time_low.to_be_bytes());
        bytes[4..6].copy_from_slice(&time_mid.to_be_bytes());
        bytes[6..8].copy_from_slice(&time_hi.to_be_bytes());
        bytes[8] = ((self.clock_sequence >> 8) as u8 & 0x3f) | VARIANT_BITS;
        bytes[9] = (self.clock_sequence as u8) ^ SIGN_FLIP;
        for (dst, src) in bytes[10..].iter_mut().zip(self.node.iter()) {
            *dst = src ^ SIGN_FLIP;
        }
        bytes
    }

    /// Decodes an id from its 16-byte representation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the slice is not 16 bytes long, or the
    /// version or variant markers do not identify a time-based id.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; TIME_ID_SIZE] = bytes.try_into().map_err(|_| {
            TimelineError::InvalidFormat(format!(
                "time id must be {TIME_ID_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;

        let version = bytes[6] >> 4;
        if version != VERSION {
            return Err(TimelineError::InvalidFormat(format!(
                "expected version {VERSION} time id, got version {version}"
            )));
        }
        if bytes[8] & VARIANT_MASK != VARIANT_BITS {
            return Err(TimelineError::InvalidFormat(format!(
                "unexpected variant bits {:#04x}",
                bytes[8] & VARIANT_MASK
            )));
        }

        let time_low = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
        let time_mid = u16::from_be_bytes([bytes[4], bytes[5]]) as u64;
        let time_hi = (u16::from_be_bytes([bytes[6], bytes[7]]) & 0x0fff) as u64;
        let clock_sequence =
            (((bytes[8] & 0x3f) as u16) << 8) | (bytes[9] ^ SIGN_FLIP) as u16;
        let mut node = [0u8; 6];
        for (dst, src) in node.iter_mut().zip(bytes[10..].iter()) {
            *dst = src ^ SIGN_FLIP;
        }

        Ok(Self {
            offset: (time_hi << 48) | (time_mid << 32) | time_low,
            clock_sequence,
            node,
        })
    }

    /// Returns the id as a UUID.
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.to_bytes())
    }

    /// Converts a UUID into a time id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the UUID is not a time-based id.
    pub fn from_uuid(uuid: Uuid) -> Result<Self> {
        Self::from_bytes(uuid.as_bytes())
    }
}

fn timestamp_offset(timestamp: Timestamp) -> Result<u64> {
    if timestamp < GREGORIAN_CALENDAR_START || timestamp > GREGORIAN_CALENDAR_END {
        return Err(TimelineError::InvalidFormat(format!(
            "timestamp {timestamp} is outside the time id range"
        )));
    }
    Ok((timestamp.ticks() - GREGORIAN_CALENDAR_START.ticks()) as u64)
}

fn node_to_u64(node: &[u8; 6]) -> u64 {
    node.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn node_from_u64(value: u64) -> [u8; 6] {
    let bytes = value.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

impl fmt::Display for TimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_uuid().hyphenated(), f)
    }
}

impl fmt::Debug for TimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeId({self}, ts={})", self.timestamp())
    }
}

impl FromStr for TimeId {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s)
            .map_err(|err| TimelineError::InvalidFormat(format!("invalid time id {s:?}: {err}")))?;
        Self::from_uuid(uuid)
    }
}

impl From<TimeId> for Uuid {
    fn from(id: TimeId) -> Self {
        id.to_uuid()
    }
}

impl TryFrom<Uuid> for TimeId {
    type Error = TimelineError;

    fn try_from(uuid: Uuid) -> Result<Self> {
        Self::from_uuid(uuid)
    }
}

impl Serialize for TimeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TimeIdVisitor;

        impl Visitor<'_> for TimeIdVisitor {
            type Value = TimeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a time-based uuid string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<TimeId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(TimeIdVisitor)
    }
}
