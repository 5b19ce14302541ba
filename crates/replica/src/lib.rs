//! Command processing at one replica.
//!
//! Every aggregate id is owned by one actor task that serializes its
//! commands, persists accepted events to the replica's event log and applies
//! events replicated in from other replicas:
//! - [`AggregateHandle`] addresses a running actor
//! - [`AggregateManager`] routes commands by aggregate id and recovers actors
//! - [`ReplicaError`] reports rejected commands and log failures

pub mod actor;
pub mod error;
pub mod manager;

pub use actor::{AggregateHandle, CommandReply, spawn};
pub use error::{ReplicaError, Result};
pub use manager::{AggregateManager, DEFAULT_MAILBOX_CAPACITY};
