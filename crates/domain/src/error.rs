//! Domain error types.

use common::AggregateId;
use event_log::EventLogError;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A command was rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An error occurred in the event log.
    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// A logged event belongs to a different aggregate.
    #[error("Event for aggregate {actual} applied to aggregate {expected}")]
    AggregateMismatch {
        expected: AggregateId,
        actual: AggregateId,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
