use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::watch;

use crate::{AggregateId, EventEnvelope, NewEvent, ReplicaId, Result, SequenceNr, Snapshot};

/// Options for appending events to the log.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Sequence number of the aggregate's latest event the writer has seen.
    /// If None, no check is performed.
    pub expected_sequence_nr: Option<SequenceNr>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the aggregate's latest event to be at `sequence_nr`.
    pub fn expect_sequence(sequence_nr: SequenceNr) -> Self {
        Self {
            expected_sequence_nr: Some(sequence_nr),
        }
    }

    /// Creates options expecting the aggregate to have no events yet.
    pub fn expect_new() -> Self {
        Self {
            expected_sequence_nr: Some(SequenceNr::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event log implementations.
///
/// A log belongs to one replica. It persists events written locally, holds
/// events replicated in from other replicas, and stamps every locally
/// written event with a vector timestamp. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// The replica this log belongs to.
    fn replica_id(&self) -> &ReplicaId;

    /// Appends an event written at this replica.
    ///
    /// Returns the stored envelope once the event is durable. If
    /// `options.expected_sequence_nr` is set, the append fails with
    /// `WriteConflict` when the aggregate's latest event is elsewhere.
    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope>;

    /// Retrieves the events of an aggregate with a sequence number of at
    /// least `from`, in log order.
    async fn read_aggregate_from(
        &self,
        aggregate_id: &AggregateId,
        from: SequenceNr,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams all events in the log, in log order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Returns the sequence number of the newest event (0 when empty).
    async fn last_sequence_nr(&self) -> Result<SequenceNr>;

    /// Subscribes to log progress.
    ///
    /// The receiver observes the newest sequence number every time an event
    /// is appended or replicated in.
    fn subscribe(&self) -> watch::Receiver<SequenceNr>;

    /// Saves a snapshot of an aggregate's state, replacing any older one.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for an aggregate.
    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event logs.
#[async_trait]
pub trait EventLogExt: EventLog {
    /// Replays every event of an aggregate in original order.
    async fn replay(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_aggregate_from(aggregate_id, SequenceNr::first())
            .await
    }

    /// Loads an aggregate's events, optionally starting from a snapshot.
    ///
    /// If a snapshot exists, returns the snapshot and events after it.
    /// Otherwise, returns None and all events.
    async fn load_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .read_aggregate_from(aggregate_id, snapshot.sequence_nr.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.replay(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventLog + ?Sized> EventLogExt for T {}
