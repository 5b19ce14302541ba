//! Order commands.

use common::{AggregateId, ReplicaId};
use event_log::VectorTime;

use crate::command::AggregateCommand;

use super::OrderEvent;

/// Command accepted by an order aggregate.
pub type OrderCommand = AggregateCommand<OrderEvent>;

impl AggregateCommand<OrderEvent> {
    /// Creates a command to create a new order.
    pub fn create_order(order_id: impl Into<AggregateId>) -> Self {
        AggregateCommand::create(OrderEvent::created(order_id))
    }

    /// Creates a command to cancel an order.
    pub fn cancel_order(order_id: impl Into<AggregateId>) -> Self {
        AggregateCommand::update(OrderEvent::cancelled(order_id))
    }

    /// Creates a command to add an item to an order.
    pub fn add_order_item(order_id: impl Into<AggregateId>, item: impl Into<String>) -> Self {
        AggregateCommand::update(OrderEvent::item_added(order_id, item))
    }

    /// Creates a command to remove an item from an order.
    pub fn remove_order_item(order_id: impl Into<AggregateId>, item: impl Into<String>) -> Self {
        AggregateCommand::update(OrderEvent::item_removed(order_id, item))
    }

    /// Creates a command selecting the version of an order with timestamp
    /// `selected`.
    pub fn resolve_order(
        order_id: impl Into<AggregateId>,
        selected: VectorTime,
        requester: impl Into<ReplicaId>,
    ) -> Self {
        AggregateCommand::resolve(order_id.into(), selected, requester.into())
    }
}
