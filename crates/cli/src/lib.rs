//! Interactive console for an in-process cluster of order replicas.
//!
//! Each replica owns an event log, aggregate actors and an order updates
//! read model. Replicas exchange events only on an explicit `sync`, so
//! concurrent updates and their resolution can be played through by hand.

pub mod cluster;
pub mod config;
pub mod console;
pub mod error;

pub use cluster::{Cluster, Outcome, ReplicaNode};
pub use config::Config;
pub use console::{ConsoleCommand, HELP, ReplicaOp};
pub use error::ConsoleError;
