//! Timeline - Alopex Time-Ordered Event Series
//!
//! This crate stores time-ordered events on top of a row store that offers
//! single-row compare-and-swap.
//!
//! # Components
//!
//! - [`PreciseClock`]: Lock-free, strictly increasing timestamps
//! - [`TimeId`]: 128-bit time-based ids with a total order
//! - [`CasWriter`]: Optimistic-concurrency append into time partitions
//! - [`RangeResolver`]: Turns read requests into [`EventSeriesRange`]s
//! - [`EventSeries`]: Writer, resolver and reader bundled per series
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use alopex_timeline::store::{InMemoryEventStore, InMemoryWatermarks};
//! use alopex_timeline::{Event, EventSeries, PreciseClock, RangeOutcome, RangeStart, SeriesConfig};
//!
//! let watermarks = Arc::new(InMemoryWatermarks::with_series_start(series_start));
//! let series = EventSeries::open(
//!     SeriesConfig::default(),
//!     Arc::new(InMemoryEventStore::new()),
//!     watermarks,
//!     Arc::new(PreciseClock::default()),
//! )?;
//!
//! series.write(&[Event::new("user-1", &b"signed in"[..])])?;
//!
//! if let RangeOutcome::Range(range) = series.resolve_range(RangeStart::None, None)? {
//!     for collection in series.read(&range, 100)? {
//!         println!("{} events at {}", collection.events.len(), collection.timestamp());
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod series;
pub mod store;
pub mod time;

pub use error::{Result, TimelineError};
pub use series::{
    CasWriter, EventPointer, EventSeries, EventSeriesRange, Partitioner, RangeOutcome,
    RangeResolver, RangeStart, SeriesConfig, WriteResult, MAX_EVENT_ID,
};
pub use store::{Event, EventStore, EventsCollection, StoreError, Watermarks};
pub use time::{ClockConfig, PreciseClock, TimeId, Timestamp, CLOSING_ID};
