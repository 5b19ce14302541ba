//! Core domain event traits.

use common::{AggregateId, ReplicaId};
use event_log::VectorTime;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the event type name.
    ///
    /// This is stored alongside the payload in the event log.
    fn event_type(&self) -> &'static str;

    /// Returns the aggregate this event belongs to.
    fn aggregate_id(&self) -> &AggregateId;
}

/// Events (or event payloads) that may name the replica they originate from.
///
/// Implemented per event variant; only creation facts carry an origin.
pub trait HasOrigin {
    /// The replica that produced the fact, if the fact records it.
    fn origin(&self) -> Option<&ReplicaId>;
}

/// How an event affects the set of concurrent versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    /// Brings the aggregate into existence.
    Created,
    /// Changes the value of a version.
    Updated,
    /// Selects the version with the given timestamp as the survivor.
    Resolved(&'a VectorTime),
}

/// Events of an aggregate that is tracked with concurrent versions.
pub trait AggregateEvent: DomainEvent + HasOrigin {
    /// Returns the aggregate type name (e.g. "Order").
    fn aggregate_type() -> &'static str;

    /// Classifies the event.
    fn kind(&self) -> EventKind<'_>;

    /// Tags a creation event with the replica that validated it.
    ///
    /// Other events are returned unchanged.
    fn with_origin(self, origin: ReplicaId) -> Self;

    /// Builds the event recording a resolution in favour of `selected`.
    fn resolved(aggregate_id: AggregateId, selected: VectorTime) -> Self;
}

/// Values that can be held as versions of an aggregate.
pub trait AggregateValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> AggregateValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
