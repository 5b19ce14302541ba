//! Order aggregate and related types.

mod aggregate;
mod behavior;
mod commands;
mod events;

pub use aggregate::Order;
pub use behavior::{
    OrderAggregate, ValidationPolicy, new_order_aggregate, order_behavior, project,
};
pub use commands::OrderCommand;
pub use events::{
    OrderCancelledData, OrderCreatedData, OrderEvent, OrderItemData, OrderResolvedData,
};
