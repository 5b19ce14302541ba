//! Replicated event log.
//!
//! The log is the source of truth for every aggregate: it assigns each
//! appended event a local sequence number and a vector timestamp, replays
//! history on recovery, notifies subscribers about progress and copies
//! events between replicas.

pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod snapshot;
pub mod vector_time;

pub use common::{AggregateId, ReplicaId};
pub use error::{EventLogError, Result};
pub use event::{EventEnvelope, EventId, NewEvent, SequenceNr};
pub use log::{AppendOptions, EventLog, EventLogExt, EventStream};
pub use memory::InMemoryEventLog;
pub use snapshot::Snapshot;
pub use vector_time::{CausalOrdering, VectorTime};
