//! Domain layer for replicated, event-sourced aggregates.
//!
//! This crate provides:
//! - DomainEvent / AggregateEvent traits for events of versioned aggregates
//! - Command vocabulary (create, update, resolve)
//! - VersionedAggregate, which tracks concurrent versions and their history
//! - Validation and arbitration of commands
//! - Order entity wired into a versioned aggregate

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;
pub mod validation;
pub mod versioned;

pub use aggregate::{AggregateEvent, AggregateValue, DomainEvent, EventKind, HasOrigin};
pub use command::{AggregateCommand, CreateCommand, ResolveCommand, UpdateCommand};
pub use error::DomainError;
pub use order::{
    Order, OrderAggregate, OrderCommand, OrderEvent, ValidationPolicy, new_order_aggregate,
    order_behavior,
};
pub use validation::{Arbiter, LowestReplicaId, ValidationError};
pub use versioned::{
    AggregateSnapshot, AggregateStatus, Behavior, Resolution, Versioned, VersionedAggregate,
};
