//! Order domain events.

use common::{AggregateId, ReplicaId};
use event_log::VectorTime;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateEvent, DomainEvent, EventKind, HasOrigin};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created.
    OrderCreated(OrderCreatedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// Item was added to the order.
    OrderItemAdded(OrderItemData),

    /// Item was removed from the order.
    OrderItemRemoved(OrderItemData),

    /// Concurrent versions were resolved.
    OrderResolved(OrderResolvedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderItemAdded(_) => "OrderItemAdded",
            OrderEvent::OrderItemRemoved(_) => "OrderItemRemoved",
            OrderEvent::OrderResolved(_) => "OrderResolved",
        }
    }

    fn aggregate_id(&self) -> &AggregateId {
        match self {
            OrderEvent::OrderCreated(data) => &data.order_id,
            OrderEvent::OrderCancelled(data) => &data.order_id,
            OrderEvent::OrderItemAdded(data) | OrderEvent::OrderItemRemoved(data) => &data.order_id,
            OrderEvent::OrderResolved(data) => &data.order_id,
        }
    }
}

impl HasOrigin for OrderEvent {
    fn origin(&self) -> Option<&ReplicaId> {
        match self {
            OrderEvent::OrderCreated(data) => data.origin(),
            OrderEvent::OrderCancelled(data) => data.origin(),
            OrderEvent::OrderItemAdded(data) | OrderEvent::OrderItemRemoved(data) => data.origin(),
            OrderEvent::OrderResolved(data) => data.origin(),
        }
    }
}

impl AggregateEvent for OrderEvent {
    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn kind(&self) -> EventKind<'_> {
        match self {
            OrderEvent::OrderCreated(_) => EventKind::Created,
            OrderEvent::OrderCancelled(_)
            | OrderEvent::OrderItemAdded(_)
            | OrderEvent::OrderItemRemoved(_) => EventKind::Updated,
            OrderEvent::OrderResolved(data) => EventKind::Resolved(&data.selected),
        }
    }

    fn with_origin(self, origin: ReplicaId) -> Self {
        match self {
            OrderEvent::OrderCreated(data) => OrderEvent::OrderCreated(OrderCreatedData {
                creator: Some(origin),
                ..data
            }),
            other => other,
        }
    }

    fn resolved(aggregate_id: AggregateId, selected: VectorTime) -> Self {
        OrderEvent::OrderResolved(OrderResolvedData {
            order_id: aggregate_id,
            selected,
        })
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    /// The order ID.
    pub order_id: AggregateId,

    /// Replica that validated the creation. Unset on a candidate event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<ReplicaId>,
}

impl HasOrigin for OrderCreatedData {
    fn origin(&self) -> Option<&ReplicaId> {
        self.creator.as_ref()
    }
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: AggregateId,
}

impl HasOrigin for OrderCancelledData {
    fn origin(&self) -> Option<&ReplicaId> {
        None
    }
}

/// Data for OrderItemAdded and OrderItemRemoved events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemData {
    pub order_id: AggregateId,

    /// Item name.
    pub item: String,
}

impl HasOrigin for OrderItemData {
    fn origin(&self) -> Option<&ReplicaId> {
        None
    }
}

/// Data for OrderResolved event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResolvedData {
    pub order_id: AggregateId,

    /// Timestamp of the version that won.
    pub selected: VectorTime,
}

impl HasOrigin for OrderResolvedData {
    fn origin(&self) -> Option<&ReplicaId> {
        None
    }
}

// Convenience constructors for events
impl OrderEvent {
    /// Creates an OrderCreated event without a creator.
    pub fn created(order_id: impl Into<AggregateId>) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id: order_id.into(),
            creator: None,
        })
    }

    /// Creates an OrderCancelled event.
    pub fn cancelled(order_id: impl Into<AggregateId>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            order_id: order_id.into(),
        })
    }

    /// Creates an OrderItemAdded event.
    pub fn item_added(order_id: impl Into<AggregateId>, item: impl Into<String>) -> Self {
        OrderEvent::OrderItemAdded(OrderItemData {
            order_id: order_id.into(),
            item: item.into(),
        })
    }

    /// Creates an OrderItemRemoved event.
    pub fn item_removed(order_id: impl Into<AggregateId>, item: impl Into<String>) -> Self {
        OrderEvent::OrderItemRemoved(OrderItemData {
            order_id: order_id.into(),
            item: item.into(),
        })
    }
}
