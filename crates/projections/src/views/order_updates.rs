//! Order updates read model: how many updates each order received.
//!
//! Counts every update event in the log, including updates on branches
//! that a later resolution discarded. Creation and resolution events are
//! not updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{AggregateEvent, EventKind, OrderEvent};
use event_log::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

/// Update counts of one order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderUpdateCounts {
    pub items_added: u64,
    pub items_removed: u64,
    pub cancellations: u64,
}

impl OrderUpdateCounts {
    pub fn total(&self) -> u64 {
        self.items_added + self.items_removed + self.cancellations
    }
}

struct OrderUpdatesState {
    orders: BTreeMap<AggregateId, OrderUpdateCounts>,
    position: ProjectionPosition,
}

/// Read model counting update events per order.
#[derive(Clone)]
pub struct OrderUpdatesView {
    state: Arc<RwLock<OrderUpdatesState>>,
}

impl OrderUpdatesView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(OrderUpdatesState {
                orders: BTreeMap::new(),
                position: ProjectionPosition::start(),
            })),
        }
    }

    /// Number of updates an order received. Zero for unknown orders.
    pub async fn update_count(&self, order_id: &AggregateId) -> u64 {
        self.counts(order_id).await.total()
    }

    /// Update counts of an order, by kind.
    pub async fn counts(&self, order_id: &AggregateId) -> OrderUpdateCounts {
        self.state
            .read()
            .await
            .orders
            .get(order_id)
            .copied()
            .unwrap_or_default()
    }

}

impl Default for OrderUpdatesView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for OrderUpdatesView {
    fn name(&self) -> &'static str {
        "OrderUpdatesView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        state.position = state.position.advance_to(event.sequence_nr);

        if event.aggregate_type != OrderEvent::aggregate_type() {
            return Ok(());
        }

        let order_event: OrderEvent = event.decode()?;
        if order_event.kind() != EventKind::Updated {
            return Ok(());
        }

        let counts = state.orders.entry(event.aggregate_id.clone()).or_default();
        match order_event {
            OrderEvent::OrderItemAdded(_) => counts.items_added += 1,
            OrderEvent::OrderItemRemoved(_) => counts.items_removed += 1,
            OrderEvent::OrderCancelled(_) => counts.cancellations += 1,
            OrderEvent::OrderCreated(_) | OrderEvent::OrderResolved(_) => {}
        }
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.position = ProjectionPosition::start();
        Ok(())
    }
}
