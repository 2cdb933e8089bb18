//! Error and Result types for timeline operations.

use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// A convenience `Result` type for timeline operations.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// The error type for timeline operations.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Malformed identifier, column name or partition key.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The writer could not commit within its retry budget.
    #[error("Operation timed out after {timeout:?}")]
    OperationTimeout {
        /// The configured operations timeout.
        timeout: Duration,
    },

    /// The maximal time id has no successor.
    #[error("Time id overflow: the maximal time id has no successor")]
    IdOverflow,

    /// Configuration values that cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A write was issued without any events.
    #[error("Write requires at least one event")]
    EmptyWrite,

    /// Failure reported by the backing store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
