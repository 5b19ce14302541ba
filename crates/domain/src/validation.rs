//! Command validation against the current set of versions.
//!
//! Validation is pure: it looks at the versions an aggregate holds right now
//! and either returns the event a command would produce or a
//! [`ValidationError`]. Nothing is written and nothing is applied here.

use std::collections::BTreeSet;

use common::{AggregateId, ReplicaId};
use event_log::VectorTime;
use thiserror::Error;

use crate::aggregate::{AggregateEvent, AggregateValue};
use crate::command::AggregateCommand;
use crate::versioned::VersionedAggregate;

/// Reasons a command is rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A create command targeted an aggregate that already exists.
    #[error("Aggregate {0} already exists")]
    AlreadyExists(AggregateId),

    /// The aggregate holds concurrent versions that must be resolved first.
    #[error("Aggregate {aggregate_id} has conflicting versions: {}", format_timestamps(.competing))]
    ConflictExists {
        aggregate_id: AggregateId,
        competing: Vec<VectorTime>,
    },

    /// The aggregate has not been created.
    #[error("Aggregate {0} not found")]
    NotFound(AggregateId),

    /// A resolution was requested while there is nothing to resolve.
    #[error("Aggregate {0} has no conflicting versions")]
    NoConflict(AggregateId),

    /// The selected timestamp is not one of the current versions.
    #[error("Timestamp {selected} does not identify a version of aggregate {aggregate_id}")]
    InvalidResolutionTarget {
        aggregate_id: AggregateId,
        selected: VectorTime,
    },

    /// Another replica is responsible for resolving this conflict.
    #[error("Replica {requester} may not resolve aggregate {aggregate_id}; arbiter is {arbiter}")]
    UnauthorizedResolver {
        aggregate_id: AggregateId,
        requester: ReplicaId,
        arbiter: ReplicaId,
    },

    /// An item to remove is not part of the current version.
    #[error("Item {item} not found in aggregate {aggregate_id}")]
    ItemNotFound { aggregate_id: AggregateId, item: String },
}

fn format_timestamps(timestamps: &[VectorTime]) -> String {
    timestamps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decides which replica may resolve a conflict.
///
/// Implementations must be pure and total over non-empty sets of
/// contributing replicas, so every replica that sees the same branches
/// computes the same arbiter.
pub trait Arbiter: Send + Sync {
    /// Returns the replica allowed to resolve, or None for an empty set.
    fn select(&self, contributors: &BTreeSet<ReplicaId>) -> Option<ReplicaId>;
}

/// Arbitration policy choosing the lexicographically lowest replica id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestReplicaId;

impl Arbiter for LowestReplicaId {
    fn select(&self, contributors: &BTreeSet<ReplicaId>) -> Option<ReplicaId> {
        contributors.first().cloned()
    }
}

impl<S, E> VersionedAggregate<S, E>
where
    S: AggregateValue,
    E: AggregateEvent,
{
    /// Validates any command, dispatching on its category.
    ///
    /// `local_replica` is the replica the command was submitted to; it
    /// becomes the creator of a validated creation event.
    pub fn validate(
        &self,
        command: AggregateCommand<E>,
        local_replica: &ReplicaId,
    ) -> Result<E, ValidationError> {
        match command {
            AggregateCommand::Create(cmd) => self.validate_create(cmd.into_event(), local_replica),
            AggregateCommand::Update(cmd) => self.validate_update(cmd.into_event()),
            AggregateCommand::Resolve(cmd) => {
                self.validate_resolve(cmd.selected(), cmd.requester())
            }
        }
    }

    /// Succeeds only while no version exists.
    pub fn validate_create(&self, candidate: E, creator: &ReplicaId) -> Result<E, ValidationError> {
        if self.is_created() {
            return Err(ValidationError::AlreadyExists(self.id().clone()));
        }
        Ok(candidate.with_origin(creator.clone()))
    }

    /// Succeeds only when exactly one version exists and the domain check
    /// accepts the candidate against it.
    pub fn validate_update(&self, candidate: E) -> Result<E, ValidationError> {
        match self.versions() {
            [] => Err(ValidationError::NotFound(self.id().clone())),
            [current] => {
                self.behavior().check(&current.value, &candidate)?;
                Ok(candidate)
            }
            branches => Err(ValidationError::ConflictExists {
                aggregate_id: self.id().clone(),
                competing: branches
                    .iter()
                    .map(|v| v.vector_timestamp.clone())
                    .collect(),
            }),
        }
    }

    /// Succeeds only when concurrent versions exist, `selected` names one of
    /// them, and `requester` is the arbiter for the contributing replicas.
    pub fn validate_resolve(
        &self,
        selected: &VectorTime,
        requester: &ReplicaId,
    ) -> Result<E, ValidationError> {
        let id = self.id();
        match self.versions().len() {
            0 => return Err(ValidationError::NotFound(id.clone())),
            1 => return Err(ValidationError::NoConflict(id.clone())),
            _ => {}
        }

        if !self
            .versions()
            .iter()
            .any(|v| &v.vector_timestamp == selected)
        {
            return Err(ValidationError::InvalidResolutionTarget {
                aggregate_id: id.clone(),
                selected: selected.clone(),
            });
        }

        // At least two versions exist, so there is at least one contributor.
        let arbiter = self.arbiter().unwrap_or_else(|| requester.clone());
        if &arbiter != requester {
            return Err(ValidationError::UnauthorizedResolver {
                aggregate_id: id.clone(),
                requester: requester.clone(),
                arbiter,
            });
        }

        Ok(E::resolved(id.clone(), selected.clone()))
    }

    /// Replicas that contributed to any current version.
    pub fn contributors(&self) -> BTreeSet<ReplicaId> {
        self.versions()
            .iter()
            .flat_map(|v| v.update_sequence.iter().cloned())
            .collect()
    }

    /// The replica allowed to resolve the current versions.
    pub fn arbiter(&self) -> Option<ReplicaId> {
        self.behavior().arbiter().select(&self.contributors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicas(ids: &[&str]) -> BTreeSet<ReplicaId> {
        ids.iter().map(|id| ReplicaId::new(*id)).collect()
    }

    #[test]
    fn lowest_replica_id_picks_first_in_order() {
        let arbiter = LowestReplicaId;
        assert_eq!(
            arbiter.select(&replicas(&["C", "A", "B"])),
            Some(ReplicaId::new("A"))
        );
        assert_eq!(arbiter.select(&BTreeSet::new()), None);
    }

    #[test]
    fn conflict_error_lists_competing_timestamps() {
        let error = ValidationError::ConflictExists {
            aggregate_id: AggregateId::new("O1"),
            competing: vec![
                VectorTime::from_entries([("A", 3)]),
                VectorTime::from_entries([("A", 2), ("B", 1)]),
            ],
        };
        assert_eq!(
            error.to_string(),
            "Aggregate O1 has conflicting versions: {A:3}, {A:2,B:1}"
        );
    }

    #[test]
    fn unauthorized_resolver_names_arbiter() {
        let error = ValidationError::UnauthorizedResolver {
            aggregate_id: AggregateId::new("O1"),
            requester: ReplicaId::new("B"),
            arbiter: ReplicaId::new("A"),
        };
        assert!(error.to_string().contains("arbiter is A"));
    }
}
