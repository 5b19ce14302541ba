//! Commands addressed to a versioned aggregate.
//!
//! A command carries everything validation needs: create and update
//! commands hold the candidate event they would produce, resolve commands
//! hold the selected timestamp and the replica asking for it.

use common::{AggregateId, ReplicaId};
use event_log::VectorTime;

use crate::aggregate::AggregateEvent;

/// Intention to bring an aggregate into existence.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommand<E> {
    aggregate_id: AggregateId,
    event: E,
}

impl<E: AggregateEvent> CreateCommand<E> {
    pub fn new(event: E) -> Self {
        Self {
            aggregate_id: event.aggregate_id().clone(),
            event,
        }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn into_event(self) -> E {
        self.event
    }
}

/// Intention to change the single current version.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand<E> {
    aggregate_id: AggregateId,
    event: E,
}

impl<E: AggregateEvent> UpdateCommand<E> {
    pub fn new(event: E) -> Self {
        Self {
            aggregate_id: event.aggregate_id().clone(),
            event,
        }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn into_event(self) -> E {
        self.event
    }
}

/// Intention to collapse concurrent versions onto one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveCommand {
    aggregate_id: AggregateId,
    selected: VectorTime,
    requester: ReplicaId,
}

impl ResolveCommand {
    pub fn new(aggregate_id: AggregateId, selected: VectorTime, requester: ReplicaId) -> Self {
        Self {
            aggregate_id,
            selected,
            requester,
        }
    }

    /// Timestamp of the version that should survive.
    pub fn selected(&self) -> &VectorTime {
        &self.selected
    }

    /// Replica that asked for the resolution.
    pub fn requester(&self) -> &ReplicaId {
        &self.requester
    }
}

/// Any command a versioned aggregate accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateCommand<E> {
    Create(CreateCommand<E>),
    Update(UpdateCommand<E>),
    Resolve(ResolveCommand),
}

impl<E: AggregateEvent> AggregateCommand<E> {
    pub fn create(event: E) -> Self {
        AggregateCommand::Create(CreateCommand::new(event))
    }

    pub fn update(event: E) -> Self {
        AggregateCommand::Update(UpdateCommand::new(event))
    }

    pub fn resolve(aggregate_id: AggregateId, selected: VectorTime, requester: ReplicaId) -> Self {
        AggregateCommand::Resolve(ResolveCommand::new(aggregate_id, selected, requester))
    }

    /// Short name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateCommand::Create(_) => "create",
            AggregateCommand::Update(_) => "update",
            AggregateCommand::Resolve(_) => "resolve",
        }
    }
}

impl<E> AggregateCommand<E> {
    pub fn aggregate_id(&self) -> &AggregateId {
        match self {
            AggregateCommand::Create(cmd) => &cmd.aggregate_id,
            AggregateCommand::Update(cmd) => &cmd.aggregate_id,
            AggregateCommand::Resolve(cmd) => &cmd.aggregate_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderEvent;

    #[test]
    fn update_command_targets_event_aggregate() {
        let command = AggregateCommand::update(OrderEvent::item_added("O1", "apple"));

        assert_eq!(command.aggregate_id(), &AggregateId::new("O1"));
        assert_eq!(command.name(), "update");
    }

    #[test]
    fn resolve_command_carries_selection() {
        let selected = VectorTime::from_entries([("A", 2)]);
        let command: AggregateCommand<OrderEvent> =
            AggregateCommand::resolve(AggregateId::new("O1"), selected.clone(), ReplicaId::new("A"));

        assert_eq!(command.aggregate_id(), &AggregateId::new("O1"));
        match command {
            AggregateCommand::Resolve(cmd) => {
                assert_eq!(cmd.selected(), &selected);
                assert_eq!(cmd.requester(), &ReplicaId::new("A"));
            }
            other => panic!("expected resolve, got {other:?}"),
        }
    }
}
