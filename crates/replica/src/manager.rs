//! Routing of commands to aggregate actors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{AggregateId, ReplicaId};
use domain::{AggregateCommand, AggregateEvent, AggregateValue, Behavior, Versioned};
use event_log::{EventLog, SequenceNr};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::actor::{self, AggregateHandle, CommandReply};
use crate::error::{ReplicaError, Result};

/// Default number of messages an actor's mailbox holds.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

struct ActorSlot<S, E> {
    handle: AggregateHandle<S, E>,
    last_used: Instant,
}

/// Owns the aggregate actors of one replica.
///
/// Actors are spawned (and recovered from the log) the first time their id
/// is used. An actor that stopped is recovered again on next use.
///
/// Without an idle timeout every id ever used keeps a running actor for the
/// lifetime of the manager. With [`with_idle_timeout`], actors unused for
/// longer than the timeout are released on the next lookup; they finish
/// the messages already queued and stop once no caller holds their handle.
/// A released actor that is still held may overlap with its replacement;
/// appends expect the aggregate's last sequence number, so the stale one
/// gets a write conflict instead of forking the log.
///
/// [`with_idle_timeout`]: AggregateManager::with_idle_timeout
pub struct AggregateManager<S, E, L> {
    log: Arc<L>,
    behavior: Behavior<S, E>,
    mailbox_capacity: usize,
    idle_timeout: Option<Duration>,
    actors: Mutex<HashMap<AggregateId, ActorSlot<S, E>>>,
}

impl<S, E, L> AggregateManager<S, E, L>
where
    S: AggregateValue,
    E: AggregateEvent,
    L: EventLog + 'static,
{
    /// Creates a manager for the aggregates stored in `log`.
    pub fn new(log: Arc<L>, behavior: Behavior<S, E>) -> Self {
        Self {
            log,
            behavior,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout: None,
            actors: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the mailbox capacity of actors spawned from now on.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Releases actors that were not used for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn replica_id(&self) -> &ReplicaId {
        self.log.replica_id()
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    /// Returns the handle of an aggregate's actor, spawning it if needed.
    ///
    /// Recovery runs without holding the actor table, so commands for other
    /// aggregates are not held up by a slow replay.
    pub async fn handle(&self, aggregate_id: &AggregateId) -> Result<AggregateHandle<S, E>> {
        if let Some(handle) = self.running(aggregate_id).await {
            return Ok(handle);
        }

        let spawned = actor::spawn(
            aggregate_id.clone(),
            self.behavior.clone(),
            Arc::clone(&self.log),
            self.mailbox_capacity,
        )
        .await?;

        let mut actors = self.actors.lock().await;
        let now = Instant::now();
        // Another caller may have recovered the same aggregate meanwhile;
        // keep theirs, ours stops when `spawned` is dropped.
        if let Some(slot) = actors.get_mut(aggregate_id)
            && !slot.handle.is_closed()
        {
            slot.last_used = now;
            return Ok(slot.handle.clone());
        }
        actors.insert(
            aggregate_id.clone(),
            ActorSlot {
                handle: spawned.clone(),
                last_used: now,
            },
        );
        Ok(spawned)
    }

    /// Looks up a live actor and releases idle and stopped ones.
    async fn running(&self, aggregate_id: &AggregateId) -> Option<AggregateHandle<S, E>> {
        let mut actors = self.actors.lock().await;
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        let before = actors.len();
        actors.retain(|id, slot| {
            let idle = idle_timeout
                .is_some_and(|timeout| now.duration_since(slot.last_used) > timeout);
            id == aggregate_id || !(idle || slot.handle.is_closed())
        });
        let released = before - actors.len();
        if released > 0 {
            tracing::debug!(released, "released idle aggregate actors");
        }

        let slot = actors.get_mut(aggregate_id)?;
        if slot.handle.is_closed() {
            return None;
        }
        slot.last_used = now;
        Some(slot.handle.clone())
    }

    /// Routes a command to the actor of its aggregate.
    #[tracing::instrument(
        skip(self, command),
        fields(replica = %self.replica_id(), aggregate_id = %command.aggregate_id())
    )]
    pub async fn execute(&self, command: AggregateCommand<E>) -> Result<CommandReply<S, E>> {
        let handle = self.handle(command.aggregate_id()).await?;
        handle.execute(command).await
    }

    /// Returns the current versions of an aggregate.
    pub async fn state(&self, aggregate_id: &AggregateId) -> Result<Vec<Versioned<S>>> {
        self.handle(aggregate_id).await?.state().await
    }

    /// Returns the current versions of every aggregate with a running
    /// actor, ordered by id.
    pub async fn states(&self) -> Result<BTreeMap<AggregateId, Vec<Versioned<S>>>> {
        let mut states = BTreeMap::new();
        for aggregate_id in self.aggregate_ids().await {
            let versions = self.state(&aggregate_id).await?;
            states.insert(aggregate_id, versions);
        }
        Ok(states)
    }

    /// Stores a snapshot of an aggregate.
    pub async fn save_snapshot(&self, aggregate_id: &AggregateId) -> Result<SequenceNr> {
        self.handle(aggregate_id).await?.save_snapshot().await
    }

    /// Ids of the aggregates with a running actor, in order.
    pub async fn aggregate_ids(&self) -> Vec<AggregateId> {
        let actors = self.actors.lock().await;
        let ids: BTreeSet<_> = actors
            .iter()
            .filter(|(_, slot)| !slot.handle.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter().collect()
    }

    /// Spawns actors for every aggregate of this type found in the log.
    ///
    /// Returns the number of aggregates recovered.
    #[tracing::instrument(skip(self), fields(replica = %self.replica_id()))]
    pub async fn recover_all(&self) -> Result<usize> {
        let mut ids = BTreeSet::new();
        let mut stream = self
            .log
            .stream_all_events()
            .await
            .map_err(ReplicaError::Scan)?;

        while let Some(result) = stream.next().await {
            let envelope = result.map_err(ReplicaError::Scan)?;
            if envelope.aggregate_type == E::aggregate_type() {
                ids.insert(envelope.aggregate_id);
            }
        }

        for aggregate_id in &ids {
            self.handle(aggregate_id).await?;
        }

        tracing::info!(recovered = ids.len(), "aggregates recovered");
        Ok(ids.len())
    }
}
