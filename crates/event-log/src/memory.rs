use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use crate::{
    AggregateId, EventEnvelope, EventLogError, NewEvent, ReplicaId, Result, SequenceNr,
    Snapshot, VectorTime,
    log::{AppendOptions, EventLog, EventStream},
};

#[derive(Debug, Default)]
struct LogState {
    events: Vec<EventEnvelope>,
    clock: VectorTime,
    snapshots: HashMap<AggregateId, Snapshot>,
    unavailable: bool,
}

impl LogState {
    fn next_sequence_nr(&self) -> SequenceNr {
        SequenceNr::new(self.events.len() as u64 + 1)
    }

    fn latest_for(&self, aggregate_id: &AggregateId) -> SequenceNr {
        self.events
            .iter()
            .rev()
            .find(|e| &e.aggregate_id == aggregate_id)
            .map(|e| e.sequence_nr)
            .unwrap_or(SequenceNr::initial())
    }

    fn ensure_available(&self, replica_id: &ReplicaId) -> Result<()> {
        if self.unavailable {
            return Err(EventLogError::Unavailable(format!(
                "log of replica {replica_id} is offline"
            )));
        }
        Ok(())
    }
}

/// In-memory event log of one replica.
///
/// Keeps every event in memory and stamps local writes with a vector clock
/// that advances this replica's entry. Cloning yields another handle to the
/// same log. Events reach other replicas through [`replicate_from`].
///
/// [`replicate_from`]: InMemoryEventLog::replicate_from
#[derive(Clone)]
pub struct InMemoryEventLog {
    replica_id: ReplicaId,
    state: Arc<RwLock<LogState>>,
    progress: Arc<watch::Sender<SequenceNr>>,
}

impl InMemoryEventLog {
    /// Creates a new empty log for a replica.
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        let (progress, _) = watch::channel(SequenceNr::initial());
        Self {
            replica_id: replica_id.into(),
            state: Arc::new(RwLock::new(LogState::default())),
            progress: Arc::new(progress),
        }
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns the log's current vector clock.
    pub async fn clock(&self) -> VectorTime {
        self.state.read().await.clock.clone()
    }

    /// Takes the log offline (or back online).
    ///
    /// While offline, appends and replication fail with `Unavailable`;
    /// reads keep working.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Copies the events of `source` this log has not seen yet.
    ///
    /// Events keep their id, vector timestamp and emitter; they get the next
    /// local sequence numbers, in the order they have in `source`. An event
    /// counts as seen when the local clock already covers its emitter's
    /// entry. Returns the number of events copied.
    #[tracing::instrument(skip(self, source), fields(from = %source.replica_id, to = %self.replica_id))]
    pub async fn replicate_from(&self, source: &InMemoryEventLog) -> Result<usize> {
        if Arc::ptr_eq(&self.state, &source.state) {
            return Ok(0);
        }

        let incoming = {
            let source_state = source.state.read().await;
            source_state.ensure_available(&source.replica_id)?;
            source_state.events.clone()
        };

        let mut state = self.state.write().await;
        state.ensure_available(&self.replica_id)?;

        let mut copied = 0;
        for event in incoming {
            let emitter_entry = event.vector_timestamp.get(&event.emitter);
            if state.clock.get(&event.emitter) >= emitter_entry {
                continue;
            }
            state.clock = state.clock.merge(&event.vector_timestamp);
            let sequence_nr = state.next_sequence_nr();
            state.events.push(EventEnvelope {
                sequence_nr,
                ..event
            });
            copied += 1;
        }

        if copied > 0 {
            let last = SequenceNr::new(state.events.len() as u64);
            drop(state);
            self.progress.send_replace(last);
            metrics::counter!("event_log_replicated_total").increment(copied as u64);
        }

        tracing::debug!(copied, "replication round finished");
        Ok(copied)
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope> {
        let mut state = self.state.write().await;
        state.ensure_available(&self.replica_id)?;

        let current = state.latest_for(&event.aggregate_id);
        if let Some(expected) = options.expected_sequence_nr
            && current != expected
        {
            return Err(EventLogError::WriteConflict {
                aggregate_id: event.aggregate_id,
                expected,
                actual: current,
            });
        }

        state.clock.increment(&self.replica_id);
        let sequence_nr = state.next_sequence_nr();
        let envelope = EventEnvelope::record(
            event,
            sequence_nr,
            state.clock.clone(),
            self.replica_id.clone(),
        );
        state.events.push(envelope.clone());
        drop(state);

        self.progress.send_replace(envelope.sequence_nr);
        metrics::counter!("event_log_appends_total").increment(1);
        tracing::debug!(
            replica = %self.replica_id,
            aggregate_id = %envelope.aggregate_id,
            sequence_nr = %envelope.sequence_nr,
            vector_timestamp = %envelope.vector_timestamp,
            "event appended"
        );

        Ok(envelope)
    }

    async fn read_aggregate_from(
        &self,
        aggregate_id: &AggregateId,
        from: SequenceNr,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id && e.sequence_nr >= from)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.state.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn last_sequence_nr(&self) -> Result<SequenceNr> {
        Ok(SequenceNr::new(self.state.read().await.events.len() as u64))
    }

    fn subscribe(&self) -> watch::Receiver<SequenceNr> {
        self.progress.subscribe()
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_available(&self.replica_id)?;
        state
            .snapshots
            .insert(snapshot.aggregate_id.clone(), snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.state.read().await.snapshots.get(aggregate_id).cloned())
    }
}
