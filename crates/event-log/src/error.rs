use thiserror::Error;

use crate::{AggregateId, SequenceNr};

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The log cannot accept or serve requests right now.
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// The aggregate's events moved on since the writer last read them.
    #[error(
        "Write conflict for aggregate {aggregate_id}: expected sequence {expected}, found {actual}"
    )]
    WriteConflict {
        aggregate_id: AggregateId,
        expected: SequenceNr,
        actual: SequenceNr,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
