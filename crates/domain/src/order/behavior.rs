//! Wiring of the order entity into a versioned aggregate.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;
use crate::versioned::{Behavior, VersionedAggregate};

use super::{Order, OrderEvent};

/// An order tracked with concurrent versions.
pub type OrderAggregate = VersionedAggregate<Order, OrderEvent>;

/// Domain checks applied to order updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Reject removing an item the order does not hold. When false the
    /// removal is accepted and changes nothing.
    pub reject_missing_items: bool,
}

impl ValidationPolicy {
    pub fn strict() -> Self {
        Self {
            reject_missing_items: true,
        }
    }

    /// Checks a candidate event against the current order.
    pub fn check(&self, order: &Order, event: &OrderEvent) -> Result<(), ValidationError> {
        match event {
            OrderEvent::OrderItemRemoved(data)
                if self.reject_missing_items && !order.contains(&data.item) =>
            {
                Err(ValidationError::ItemNotFound {
                    aggregate_id: order.id().clone(),
                    item: data.item.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Projects an event onto an order.
pub fn project(order: &Order, event: &OrderEvent) -> Order {
    match event {
        OrderEvent::OrderCreated(_) | OrderEvent::OrderResolved(_) => order.clone(),
        OrderEvent::OrderCancelled(_) => order.cancel(),
        OrderEvent::OrderItemAdded(data) => order.add_item(data.item.clone()),
        OrderEvent::OrderItemRemoved(data) => order.remove_item(&data.item),
    }
}

/// Builds the behavior of order aggregates under `policy`.
pub fn order_behavior(policy: ValidationPolicy) -> Behavior<Order, OrderEvent> {
    Behavior::new(|id: &AggregateId| Order::new(id.clone()), project)
        .with_check(move |order, event| policy.check(order, event))
}

/// Creates an empty order aggregate.
pub fn new_order_aggregate(id: AggregateId, policy: ValidationPolicy) -> OrderAggregate {
    VersionedAggregate::new(id, order_behavior(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ReplicaId;
    use event_log::VectorTime;

    use crate::aggregate::AggregateEvent;
    use crate::command::AggregateCommand;
    use crate::versioned::AggregateStatus;

    fn vt(entries: &[(&str, u64)]) -> VectorTime {
        VectorTime::from_entries(entries.iter().copied())
    }

    fn a() -> ReplicaId {
        ReplicaId::new("A")
    }

    fn b() -> ReplicaId {
        ReplicaId::new("B")
    }

    fn created_order(policy: ValidationPolicy) -> OrderAggregate {
        let mut order = new_order_aggregate(AggregateId::new("O1"), policy);
        let event = order
            .validate(AggregateCommand::create_order("O1"), &a())
            .unwrap();
        order.apply(&event, &vt(&[("A", 1)]), &a());
        order
    }

    fn conflicted_order() -> OrderAggregate {
        let mut order = created_order(ValidationPolicy::default());
        order.apply(&OrderEvent::item_added("O1", "apple"), &vt(&[("A", 2)]), &a());
        order.apply(
            &OrderEvent::item_added("O1", "pear"),
            &vt(&[("A", 1), ("B", 1)]),
            &b(),
        );
        order
    }

    #[test]
    fn test_create_tags_local_replica() {
        let order = new_order_aggregate(AggregateId::new("O1"), ValidationPolicy::default());
        let event = order
            .validate(AggregateCommand::create_order("O1"), &b())
            .unwrap();

        match event {
            OrderEvent::OrderCreated(data) => assert_eq!(data.creator, Some(b())),
            other => panic!("expected creation, got {other:?}"),
        }
    }

    #[test]
    fn test_double_create_rejected() {
        let order = created_order(ValidationPolicy::default());
        let result = order.validate(AggregateCommand::create_order("O1"), &a());

        assert_eq!(
            result,
            Err(ValidationError::AlreadyExists(AggregateId::new("O1")))
        );
    }

    #[test]
    fn test_update_before_create_rejected() {
        let order = new_order_aggregate(AggregateId::new("O1"), ValidationPolicy::default());
        let result = order.validate(AggregateCommand::add_order_item("O1", "apple"), &a());

        assert_eq!(result, Err(ValidationError::NotFound(AggregateId::new("O1"))));
    }

    #[test]
    fn test_update_under_conflict_rejected() {
        let order = conflicted_order();
        assert_eq!(order.status(), AggregateStatus::Conflicted);

        let result = order.validate(AggregateCommand::cancel_order("O1"), &a());
        match result {
            Err(ValidationError::ConflictExists { competing, .. }) => {
                assert_eq!(competing.len(), 2);
                assert!(competing.contains(&vt(&[("A", 2)])));
                assert!(competing.contains(&vt(&[("A", 1), ("B", 1)])));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_missing_item_tolerated_by_default() {
        let mut order = created_order(ValidationPolicy::default());
        let event = order
            .validate(AggregateCommand::remove_order_item("O1", "apple"), &a())
            .unwrap();
        order.apply(&event, &vt(&[("A", 2)]), &a());

        assert!(order.versions()[0].value.items().is_empty());
    }

    #[test]
    fn test_remove_missing_item_rejected_when_strict() {
        let order = created_order(ValidationPolicy::strict());
        let result = order.validate(AggregateCommand::remove_order_item("O1", "apple"), &a());

        assert_eq!(
            result,
            Err(ValidationError::ItemNotFound {
                aggregate_id: AggregateId::new("O1"),
                item: "apple".to_string(),
            })
        );
    }

    #[test]
    fn test_resolve_without_conflict_rejected() {
        let order = created_order(ValidationPolicy::default());
        let result = order.validate(
            AggregateCommand::resolve_order("O1", vt(&[("A", 1)]), "A"),
            &a(),
        );

        assert_eq!(result, Err(ValidationError::NoConflict(AggregateId::new("O1"))));
    }

    #[test]
    fn test_resolve_unknown_target_rejected() {
        let order = conflicted_order();
        let result = order.validate(
            AggregateCommand::resolve_order("O1", vt(&[("A", 7)]), "A"),
            &a(),
        );

        assert!(matches!(
            result,
            Err(ValidationError::InvalidResolutionTarget { .. })
        ));
    }

    #[test]
    fn test_resolve_by_non_arbiter_rejected() {
        let order = conflicted_order();
        assert_eq!(order.arbiter(), Some(a()));

        let result = order.validate(
            AggregateCommand::resolve_order("O1", vt(&[("A", 2)]), "B"),
            &b(),
        );

        assert_eq!(
            result,
            Err(ValidationError::UnauthorizedResolver {
                aggregate_id: AggregateId::new("O1"),
                requester: b(),
                arbiter: a(),
            })
        );
    }

    #[test]
    fn test_resolve_collapses_to_selected_version() {
        let mut order = conflicted_order();
        let selected = vt(&[("A", 2)]);
        let event = order
            .validate(
                AggregateCommand::resolve_order("O1", selected.clone(), "A"),
                &a(),
            )
            .unwrap();
        assert_eq!(
            event,
            OrderEvent::resolved(AggregateId::new("O1"), selected.clone())
        );

        order.apply(&event, &vt(&[("A", 3), ("B", 1)]), &a());

        assert_eq!(order.status(), AggregateStatus::Single);
        assert_eq!(order.versions()[0].vector_timestamp, selected);
        assert_eq!(order.versions()[0].value.items(), ["apple"]);
    }
}
