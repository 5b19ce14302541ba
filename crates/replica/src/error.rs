//! Replica error types.

use common::AggregateId;
use domain::{DomainError, ValidationError};
use event_log::EventLogError;
use thiserror::Error;

/// Errors returned to callers of an aggregate actor.
///
/// Every variant except [`ReplicaError::Scan`] names the aggregate the
/// failure belongs to.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The command was rejected; nothing was written.
    #[error("Command rejected for aggregate {aggregate_id}: {source}")]
    Validation {
        aggregate_id: AggregateId,
        #[source]
        source: ValidationError,
    },

    /// The validated event could not be written to the log.
    #[error("Append failed for aggregate {aggregate_id}: {source}")]
    Append {
        aggregate_id: AggregateId,
        #[source]
        source: EventLogError,
    },

    /// The aggregate could not be rebuilt from its snapshot and events.
    #[error("Recovery failed for aggregate {aggregate_id}: {source}")]
    Recovery {
        aggregate_id: AggregateId,
        #[source]
        source: DomainError,
    },

    /// Events replicated into the log could not be applied.
    #[error("Catch-up failed for aggregate {aggregate_id}: {source}")]
    Catchup {
        aggregate_id: AggregateId,
        #[source]
        source: DomainError,
    },

    /// A snapshot could not be stored.
    #[error("Snapshot failed for aggregate {aggregate_id}: {source}")]
    Snapshot {
        aggregate_id: AggregateId,
        #[source]
        source: EventLogError,
    },

    /// The actor owning the aggregate is no longer running.
    #[error("Actor for aggregate {0} has stopped")]
    ActorStopped(AggregateId),

    /// The log could not be scanned for aggregates to recover.
    #[error("Scanning the event log failed: {0}")]
    Scan(#[source] EventLogError),

    /// Serialization error.
    #[error("Serialization failed for aggregate {aggregate_id}: {source}")]
    Serialization {
        aggregate_id: AggregateId,
        #[source]
        source: serde_json::Error,
    },
}

impl ReplicaError {
    /// The aggregate the failure belongs to. None for log scans, which
    /// are not tied to one aggregate.
    pub fn aggregate_id(&self) -> Option<&AggregateId> {
        match self {
            ReplicaError::Validation { aggregate_id, .. }
            | ReplicaError::Append { aggregate_id, .. }
            | ReplicaError::Recovery { aggregate_id, .. }
            | ReplicaError::Catchup { aggregate_id, .. }
            | ReplicaError::Snapshot { aggregate_id, .. }
            | ReplicaError::Serialization { aggregate_id, .. } => Some(aggregate_id),
            ReplicaError::ActorStopped(aggregate_id) => Some(aggregate_id),
            ReplicaError::Scan(_) => None,
        }
    }

    /// Returns the validation failure, if the command was rejected.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ReplicaError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicaError::Validation { .. } => "validation",
            ReplicaError::Append { .. } => "append",
            ReplicaError::Recovery { .. } => "recovery",
            ReplicaError::Catchup { .. } => "catchup",
            ReplicaError::Snapshot { .. } => "snapshot",
            ReplicaError::ActorStopped(_) => "actor_stopped",
            ReplicaError::Scan(_) => "scan",
            ReplicaError::Serialization { .. } => "serialization",
        }
    }
}

/// Convenience type alias for replica results.
pub type Result<T> = std::result::Result<T, ReplicaError>;
