//! Single-task owner of one versioned aggregate.
//!
//! Each aggregate id gets one tokio task that holds its
//! [`VersionedAggregate`] and serves a bounded mailbox. Commands are handled
//! one at a time: catch up on the log, validate, append, apply, reply. The
//! next message is not read until the current one has been answered, so
//! validation always sees the state the previous command produced.
//!
//! Between commands the task also follows the log's progress notifications
//! and applies events replicated in from other replicas.

use std::sync::Arc;
use std::time::Instant;

use common::AggregateId;
use domain::{
    AggregateCommand, AggregateEvent, AggregateSnapshot, AggregateStatus, AggregateValue,
    Behavior, DomainError, Versioned, VersionedAggregate,
};
use event_log::{
    AppendOptions, EventEnvelope, EventLog, EventLogExt, NewEvent, SequenceNr, Snapshot,
    VectorTime,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{ReplicaError, Result};

/// Outcome of a command that was validated, persisted and applied.
#[derive(Debug, Clone)]
pub struct CommandReply<S, E> {
    pub aggregate_id: AggregateId,

    /// The event as stored in the log.
    pub event: E,

    /// Position the log assigned to the event.
    pub sequence_nr: SequenceNr,

    /// Timestamp the log assigned to the event.
    pub vector_timestamp: VectorTime,

    /// All versions after the event was applied.
    pub versions: Vec<Versioned<S>>,
}

enum Message<S, E> {
    Command {
        command: AggregateCommand<E>,
        reply: oneshot::Sender<Result<CommandReply<S, E>>>,
    },
    GetState {
        reply: oneshot::Sender<Result<Vec<Versioned<S>>>>,
    },
    SaveSnapshot {
        reply: oneshot::Sender<Result<SequenceNr>>,
    },
}

/// Cloneable address of a running aggregate actor.
pub struct AggregateHandle<S, E> {
    aggregate_id: AggregateId,
    sender: mpsc::Sender<Message<S, E>>,
}

impl<S, E> Clone for AggregateHandle<S, E> {
    fn clone(&self) -> Self {
        Self {
            aggregate_id: self.aggregate_id.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<S, E> AggregateHandle<S, E>
where
    S: AggregateValue,
    E: AggregateEvent,
{
    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    /// Returns true once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Validates, persists and applies a command.
    pub async fn execute(&self, command: AggregateCommand<E>) -> Result<CommandReply<S, E>> {
        self.request(|reply| Message::Command { command, reply })
            .await
    }

    /// Returns every current version, after catching up on the log.
    pub async fn state(&self) -> Result<Vec<Versioned<S>>> {
        self.request(|reply| Message::GetState { reply }).await
    }

    /// Stores a snapshot and returns the sequence number it covers.
    pub async fn save_snapshot(&self) -> Result<SequenceNr> {
        self.request(|reply| Message::SaveSnapshot { reply }).await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> Message<S, E>,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .await
            .map_err(|_| ReplicaError::ActorStopped(self.aggregate_id.clone()))?;
        response
            .await
            .map_err(|_| ReplicaError::ActorStopped(self.aggregate_id.clone()))?
    }
}

/// Recovers an aggregate from `log` and starts its actor.
///
/// Fails if the snapshot or any logged event cannot be applied; no task is
/// spawned in that case.
pub async fn spawn<S, E, L>(
    aggregate_id: AggregateId,
    behavior: Behavior<S, E>,
    log: Arc<L>,
    mailbox_capacity: usize,
) -> Result<AggregateHandle<S, E>>
where
    S: AggregateValue,
    E: AggregateEvent,
    L: EventLog + 'static,
{
    // Subscribe first so nothing appended during recovery goes unnoticed.
    let progress = log.subscribe();
    let actor = AggregateActor::recover(aggregate_id.clone(), behavior, log).await?;

    let (sender, receiver) = mpsc::channel(mailbox_capacity.max(1));
    tokio::spawn(actor.run(receiver, progress));

    Ok(AggregateHandle {
        aggregate_id,
        sender,
    })
}

struct AggregateActor<S, E, L> {
    aggregate: VersionedAggregate<S, E>,
    log: Arc<L>,
    // Sequence number of the last event of this aggregate that was applied.
    last_sequence_nr: SequenceNr,
}

impl<S, E, L> AggregateActor<S, E, L>
where
    S: AggregateValue,
    E: AggregateEvent,
    L: EventLog + 'static,
{
    #[tracing::instrument(skip(behavior, log), fields(replica = %log.replica_id()))]
    async fn recover(
        aggregate_id: AggregateId,
        behavior: Behavior<S, E>,
        log: Arc<L>,
    ) -> Result<Self> {
        let started = Instant::now();
        let recovery_error = |source: DomainError| ReplicaError::Recovery {
            aggregate_id: aggregate_id.clone(),
            source,
        };

        let (snapshot, events) = log
            .load_aggregate(&aggregate_id)
            .await
            .map_err(|e| recovery_error(e.into()))?;

        let mut actor = Self {
            aggregate: VersionedAggregate::new(aggregate_id.clone(), behavior),
            log,
            last_sequence_nr: SequenceNr::initial(),
        };

        if let Some(snapshot) = snapshot {
            let sequence_nr = snapshot.sequence_nr;
            let state: AggregateSnapshot<S> =
                snapshot.into_state().map_err(|e| recovery_error(e.into()))?;
            actor.aggregate.restore(state);
            actor.last_sequence_nr = sequence_nr;
        }

        let replayed = events.len();
        for envelope in &events {
            actor.apply(envelope).map_err(recovery_error)?;
        }

        metrics::histogram!("aggregate_recovery_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            replayed,
            sequence_nr = %actor.last_sequence_nr,
            branches = actor.aggregate.versions().len(),
            "aggregate recovered"
        );

        Ok(actor)
    }

    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<Message<S, E>>,
        mut progress: watch::Receiver<SequenceNr>,
    ) {
        let mut following = true;
        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                changed = progress.changed(), if following => {
                    if changed.is_err() {
                        following = false;
                        continue;
                    }
                    if let Err(error) = self.catch_up().await {
                        tracing::error!(%error, "stopping aggregate actor");
                        break;
                    }
                }
            }
        }
        tracing::debug!(aggregate_id = %self.aggregate.id(), "aggregate actor stopped");
    }

    async fn handle(&mut self, message: Message<S, E>) {
        // A dropped receiver means the caller gave up waiting; nothing to do.
        match message {
            Message::Command { command, reply } => {
                let _ = reply.send(self.execute(command).await);
            }
            Message::GetState { reply } => {
                let result = self
                    .catch_up()
                    .await
                    .map(|()| self.aggregate.versions().to_vec());
                let _ = reply.send(result);
            }
            Message::SaveSnapshot { reply } => {
                let _ = reply.send(self.save_snapshot().await);
            }
        }
    }

    #[tracing::instrument(
        skip(self, command),
        fields(aggregate_id = %self.aggregate.id(), command = command.name())
    )]
    async fn execute(&mut self, command: AggregateCommand<E>) -> Result<CommandReply<S, E>> {
        let name = command.name();
        metrics::counter!("aggregate_commands_total", "command" => name).increment(1);

        let result = self.validate_and_persist(command).await;
        if let Err(error) = &result {
            metrics::counter!(
                "aggregate_command_failures_total",
                "command" => name,
                "reason" => error.kind()
            )
            .increment(1);
            tracing::info!(%error, "command failed");
        }
        result
    }

    async fn validate_and_persist(
        &mut self,
        command: AggregateCommand<E>,
    ) -> Result<CommandReply<S, E>> {
        self.catch_up().await?;

        let aggregate_id = self.aggregate.id().clone();
        let event = self
            .aggregate
            .validate(command, self.log.replica_id())
            .map_err(|source| ReplicaError::Validation {
                aggregate_id: aggregate_id.clone(),
                source,
            })?;

        let new_event =
            NewEvent::from_payload(aggregate_id.clone(), E::aggregate_type(), event.event_type(), &event)
                .map_err(|source| ReplicaError::Serialization {
                    aggregate_id: aggregate_id.clone(),
                    source,
                })?;

        // The log refuses the write if anything for this aggregate was
        // appended after the state we validated against.
        let envelope = self
            .log
            .append(new_event, AppendOptions::expect_sequence(self.last_sequence_nr))
            .await
            .map_err(|source| ReplicaError::Append {
                aggregate_id: aggregate_id.clone(),
                source,
            })?;

        let event = self
            .apply(&envelope)
            .map_err(|source| ReplicaError::Catchup {
                aggregate_id: aggregate_id.clone(),
                source,
            })?;

        tracing::debug!(
            sequence_nr = %envelope.sequence_nr,
            vector_timestamp = %envelope.vector_timestamp,
            status = %self.aggregate.status(),
            "command applied"
        );

        Ok(CommandReply {
            aggregate_id,
            event,
            sequence_nr: envelope.sequence_nr,
            vector_timestamp: envelope.vector_timestamp,
            versions: self.aggregate.versions().to_vec(),
        })
    }

    /// Applies the events of this aggregate the log holds beyond the last
    /// applied one, in log order.
    async fn catch_up(&mut self) -> Result<()> {
        let aggregate_id = self.aggregate.id().clone();
        let catchup_error = |source: DomainError| ReplicaError::Catchup {
            aggregate_id: aggregate_id.clone(),
            source,
        };

        let events = self
            .log
            .read_aggregate_from(&aggregate_id, self.last_sequence_nr.next())
            .await
            .map_err(|e| catchup_error(e.into()))?;

        for envelope in &events {
            self.apply(envelope).map_err(catchup_error)?;
        }
        if !events.is_empty() {
            tracing::debug!(%aggregate_id, applied = events.len(), "caught up on log");
        }
        Ok(())
    }

    async fn save_snapshot(&mut self) -> Result<SequenceNr> {
        self.catch_up().await?;

        let aggregate_id = self.aggregate.id().clone();
        let snapshot = Snapshot::from_state(
            aggregate_id.clone(),
            E::aggregate_type(),
            self.last_sequence_nr,
            &self.aggregate.snapshot(),
        )
        .map_err(|source| ReplicaError::Serialization {
            aggregate_id: aggregate_id.clone(),
            source,
        })?;

        self.log
            .save_snapshot(snapshot)
            .await
            .map_err(|source| ReplicaError::Snapshot {
                aggregate_id: aggregate_id.clone(),
                source,
            })?;

        tracing::info!(%aggregate_id, sequence_nr = %self.last_sequence_nr, "snapshot saved");
        Ok(self.last_sequence_nr)
    }

    fn apply(&mut self, envelope: &EventEnvelope) -> std::result::Result<E, DomainError> {
        let before = self.aggregate.status();
        let event = self.aggregate.apply_envelope(envelope)?;
        self.last_sequence_nr = envelope.sequence_nr;

        let after = self.aggregate.status();
        if before != AggregateStatus::Conflicted && after == AggregateStatus::Conflicted {
            metrics::counter!("aggregate_conflicts_detected_total").increment(1);
            tracing::warn!(
                aggregate_id = %self.aggregate.id(),
                branches = self.aggregate.versions().len(),
                vector_timestamp = %envelope.vector_timestamp,
                "conflicting versions detected"
            );
        }
        Ok(event)
    }
}
