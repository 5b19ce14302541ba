//! Console error types.

use common::{AggregateId, ReplicaId};
use event_log::EventLogError;
use projections::ProjectionError;
use replica::ReplicaError;
use thiserror::Error;

/// Errors reported for one console line.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The line is not a known command.
    #[error("{0} (type 'help' for usage)")]
    Parse(String),

    /// The line names a replica that is not part of the cluster.
    #[error("Unknown replica: {0}")]
    UnknownReplica(ReplicaId),

    /// A resolve command named a branch that does not exist.
    #[error("Aggregate {aggregate_id} has no branch {index} ({branches} branches)")]
    BranchIndex {
        aggregate_id: AggregateId,
        index: usize,
        branches: usize,
    },

    /// The replica failed to process the command.
    #[error(transparent)]
    Replica(#[from] ReplicaError),

    /// Replication between logs failed.
    #[error("Replication failed: {0}")]
    Replication(#[from] EventLogError),

    /// A read model could not be brought up to date.
    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectionError),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
