use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, ReplicaId, VectorTime};

/// Unique identifier for an event.
///
/// The id is minted once, when the event is first appended, and survives
/// replication unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event in one replica's local log.
///
/// Sequence numbers start at 1 for the first event and increase by 1 for
/// every event written locally or replicated in. The same event usually has
/// different sequence numbers at different replicas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNr(u64);

impl SequenceNr {
    /// Creates a sequence number from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The position before any event (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// The position of the first event (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNr {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// An event the caller wants appended.
///
/// The log fills in the sequence number, vector timestamp and emitter.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewEvent {
    /// Serializes a domain event into an appendable record.
    pub fn from_payload<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// An event envelope containing an event along with the metadata the log
/// assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type of the event (e.g., "OrderCreated", "OrderItemAdded").
    pub event_type: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "Order").
    pub aggregate_type: String,

    /// Position in the local log.
    pub sequence_nr: SequenceNr,

    /// Causal timestamp assigned when the event was first written.
    pub vector_timestamp: VectorTime,

    /// Replica that originally wrote the event.
    pub emitter: ReplicaId,

    /// When the event was first written.
    pub recorded_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Stamps a new event with the metadata of its first write.
    pub fn record(
        event: NewEvent,
        sequence_nr: SequenceNr,
        vector_timestamp: VectorTime,
        emitter: ReplicaId,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event.event_type,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_nr,
            vector_timestamp,
            emitter,
            recorded_at: Utc::now(),
            payload: event.payload,
        }
    }

    /// Deserializes the payload into a concrete event type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_nr_ordering() {
        let s1 = SequenceNr::new(1);
        let s2 = SequenceNr::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
        assert_eq!(SequenceNr::initial().next(), SequenceNr::first());
    }

    #[test]
    fn record_stamps_first_write() {
        let emitter = ReplicaId::new("A");
        let mut timestamp = VectorTime::new();
        timestamp.increment(&emitter);
        let new_event = NewEvent::from_payload(
            AggregateId::new("O1"),
            "Order",
            "OrderCreated",
            &serde_json::json!({"order_id": "O1"}),
        )
        .unwrap();

        let first = EventEnvelope::record(
            new_event.clone(),
            SequenceNr::first(),
            timestamp.clone(),
            emitter.clone(),
        );
        let second = EventEnvelope::record(new_event, SequenceNr::first(), timestamp.clone(), emitter.clone());

        assert_eq!(first.aggregate_id, AggregateId::new("O1"));
        assert_eq!(first.event_type, "OrderCreated");
        assert_eq!(first.sequence_nr, SequenceNr::first());
        assert_eq!(first.vector_timestamp, timestamp);
        assert_eq!(first.emitter, emitter);
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn decode_reads_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Payload {
            item: String,
        }

        let new_event =
            NewEvent::from_payload(AggregateId::new("O1"), "Order", "Test", &serde_json::json!({"item": "apple"}))
                .unwrap();
        let envelope = EventEnvelope::record(
            new_event,
            SequenceNr::first(),
            VectorTime::new(),
            ReplicaId::new("A"),
        );

        let payload: Payload = envelope.decode().unwrap();
        assert_eq!(payload.item, "apple");
    }
}
