//! Conflict-tracking container for an aggregate's concurrent versions.
//!
//! Replicas accept writes independently, so an aggregate may hold several
//! versions whose vector timestamps are mutually concurrent. This module
//! keeps those branches, projects incoming events onto the branch they were
//! produced against, and collapses branches when a resolution arrives.

use std::collections::HashSet;
use std::sync::Arc;

use common::{AggregateId, ReplicaId};
use event_log::{EventEnvelope, VectorTime};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateEvent, AggregateValue, EventKind};
use crate::error::DomainError;
use crate::validation::{Arbiter, LowestReplicaId, ValidationError};

/// One causally-distinct value of an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<S> {
    /// The projected value.
    pub value: S,

    /// Timestamp of the last event applied to this value.
    pub vector_timestamp: VectorTime,

    /// Replicas whose events produced this value, oldest first.
    pub update_sequence: Vec<ReplicaId>,
}

impl<S> Versioned<S> {
    /// The replica that created the aggregate on this branch.
    pub fn creator(&self) -> Option<&ReplicaId> {
        self.update_sequence.first()
    }
}

/// Logical state of a versioned aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateStatus {
    /// No version exists yet.
    Uninitialized,
    /// Exactly one version exists; updates are accepted.
    Single,
    /// Concurrent versions exist; only resolution is accepted.
    Conflicted,
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AggregateStatus::Uninitialized => "Uninitialized",
            AggregateStatus::Single => "Single",
            AggregateStatus::Conflicted => "Conflicted",
        };
        write!(f, "{name}")
    }
}

/// Builds the value an aggregate starts from.
pub type InitialFn<S> = Arc<dyn Fn(&AggregateId) -> S + Send + Sync>;

/// Projects an event onto a value.
pub type ProjectionFn<S, E> = Arc<dyn Fn(&S, &E) -> S + Send + Sync>;

/// Domain-specific acceptance check for update candidates.
pub type CheckFn<S, E> = Arc<dyn Fn(&S, &E) -> Result<(), ValidationError> + Send + Sync>;

/// The caller-supplied functions that give a versioned aggregate its meaning.
pub struct Behavior<S, E> {
    initial: InitialFn<S>,
    projection: ProjectionFn<S, E>,
    check: CheckFn<S, E>,
    arbiter: Arc<dyn Arbiter>,
}

impl<S, E> Clone for Behavior<S, E> {
    fn clone(&self) -> Self {
        Self {
            initial: Arc::clone(&self.initial),
            projection: Arc::clone(&self.projection),
            check: Arc::clone(&self.check),
            arbiter: Arc::clone(&self.arbiter),
        }
    }
}

impl<S, E> Behavior<S, E> {
    /// Creates a behavior that accepts every update and resolves conflicts
    /// through the lowest replica id.
    pub fn new(
        initial: impl Fn(&AggregateId) -> S + Send + Sync + 'static,
        projection: impl Fn(&S, &E) -> S + Send + Sync + 'static,
    ) -> Self {
        Self {
            initial: Arc::new(initial),
            projection: Arc::new(projection),
            check: Arc::new(|_, _| Ok(())),
            arbiter: Arc::new(LowestReplicaId),
        }
    }

    /// Replaces the update check.
    pub fn with_check(
        mut self,
        check: impl Fn(&S, &E) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) -> Self {
        self.check = Arc::new(check);
        self
    }

    /// Replaces the arbitration policy.
    pub fn with_arbiter(mut self, arbiter: impl Arbiter + 'static) -> Self {
        self.arbiter = Arc::new(arbiter);
        self
    }

    pub(crate) fn initial(&self, id: &AggregateId) -> S {
        (self.initial)(id)
    }

    pub(crate) fn project(&self, value: &S, event: &E) -> S {
        (self.projection)(value, event)
    }

    pub(crate) fn check(&self, value: &S, event: &E) -> Result<(), ValidationError> {
        (self.check)(value, event)
    }

    pub(crate) fn arbiter(&self) -> &dyn Arbiter {
        self.arbiter.as_ref()
    }
}

/// A resolution that was applied: the branch it kept and when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub selected: VectorTime,
    pub timestamp: VectorTime,
}

impl Resolution {
    /// True if a version with timestamp `version` sat on a branch this
    /// resolution discarded: the resolver saw it, and it is neither an
    /// ancestor nor a descendant of the selected version.
    pub fn discards(&self, version: &VectorTime) -> bool {
        version.happened_before(&self.timestamp)
            && !(version >= &self.selected)
            && !(version <= &self.selected)
    }
}

/// Serializable state of a versioned aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot<S> {
    pub versions: Vec<Versioned<S>>,
    pub history: Vec<Versioned<S>>,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
    pub seen: Vec<VectorTime>,
}

/// An aggregate holding zero, one or many concurrent versions.
///
/// Mutated only through [`apply`](Self::apply) (or the per-kind
/// `apply_*` operations it dispatches to); every operation is deterministic,
/// so replaying the same events from empty yields the same versions.
pub struct VersionedAggregate<S, E> {
    id: AggregateId,
    versions: Vec<Versioned<S>>,
    // Superseded and discarded versions, in application order. Parents of
    // replicated updates that were produced against an older version or on
    // a branch a concurrent resolution discarded.
    history: Vec<Versioned<S>>,
    resolutions: Vec<Resolution>,
    seen: HashSet<VectorTime>,
    behavior: Behavior<S, E>,
}

impl<S: Clone, E> Clone for VersionedAggregate<S, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            versions: self.versions.clone(),
            history: self.history.clone(),
            resolutions: self.resolutions.clone(),
            seen: self.seen.clone(),
            behavior: self.behavior.clone(),
        }
    }
}

impl<S: std::fmt::Debug, E> std::fmt::Debug for VersionedAggregate<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedAggregate")
            .field("id", &self.id)
            .field("versions", &self.versions)
            .field("history_len", &self.history.len())
            .field("resolutions", &self.resolutions.len())
            .finish_non_exhaustive()
    }
}

impl<S, E> VersionedAggregate<S, E>
where
    S: AggregateValue,
    E: AggregateEvent,
{
    /// Creates an empty aggregate.
    pub fn new(id: AggregateId, behavior: Behavior<S, E>) -> Self {
        Self {
            id,
            versions: Vec::new(),
            history: Vec::new(),
            resolutions: Vec::new(),
            seen: HashSet::new(),
            behavior,
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// Current versions, ordered deterministically by timestamp.
    pub fn versions(&self) -> &[Versioned<S>] {
        &self.versions
    }

    pub fn status(&self) -> AggregateStatus {
        match self.versions.len() {
            0 => AggregateStatus::Uninitialized,
            1 => AggregateStatus::Single,
            _ => AggregateStatus::Conflicted,
        }
    }

    pub fn is_created(&self) -> bool {
        !self.versions.is_empty()
    }

    pub fn is_conflicting(&self) -> bool {
        self.versions.len() > 1
    }

    pub(crate) fn behavior(&self) -> &Behavior<S, E> {
        &self.behavior
    }

    /// Applies an event the log assigned `timestamp` to, written by `emitter`.
    ///
    /// Events whose timestamp was applied before are ignored.
    pub fn apply(&mut self, event: &E, timestamp: &VectorTime, emitter: &ReplicaId) {
        match event.kind() {
            EventKind::Created => self.apply_created(event, timestamp, emitter),
            EventKind::Updated => self.apply_updated(event, timestamp, emitter),
            EventKind::Resolved(selected) => {
                let selected = selected.clone();
                self.apply_resolved(&selected, timestamp);
            }
        }
    }

    /// Decodes a logged event and applies it.
    pub fn apply_envelope(&mut self, envelope: &EventEnvelope) -> Result<E, DomainError> {
        let event: E = envelope.decode()?;
        if event.aggregate_id() != &self.id {
            return Err(DomainError::AggregateMismatch {
                expected: self.id.clone(),
                actual: event.aggregate_id().clone(),
            });
        }
        self.apply(&event, &envelope.vector_timestamp, &envelope.emitter);
        Ok(event)
    }

    /// Starts a version from the initial value.
    ///
    /// A creation concurrent with existing versions (two replicas created
    /// the same id) becomes an additional branch.
    pub fn apply_created(&mut self, event: &E, timestamp: &VectorTime, emitter: &ReplicaId) {
        if !self.seen.insert(timestamp.clone()) {
            return;
        }

        let origin = event.origin().unwrap_or(emitter).clone();
        let value = self.behavior.project(&self.behavior.initial(&self.id), event);
        self.supersede(timestamp);
        if self.is_created() {
            tracing::warn!(aggregate_id = %self.id, %timestamp, "concurrent creation");
        }
        self.push_version(Versioned {
            value,
            vector_timestamp: timestamp.clone(),
            update_sequence: vec![origin],
        });
    }

    /// Projects an update onto its causal parent.
    ///
    /// Every current version that causally precedes the event is replaced by
    /// the projected value; versions concurrent with it remain as branches.
    pub fn apply_updated(&mut self, event: &E, timestamp: &VectorTime, emitter: &ReplicaId) {
        if !self.seen.insert(timestamp.clone()) {
            return;
        }

        let (base, mut update_sequence) = match self.causal_parent(timestamp) {
            Some(parent) => (parent.value.clone(), parent.update_sequence.clone()),
            None => {
                tracing::warn!(aggregate_id = %self.id, %timestamp, "update without causal parent");
                (self.behavior.initial(&self.id), Vec::new())
            }
        };
        update_sequence.push(emitter.clone());

        let value = self.behavior.project(&base, event);
        self.supersede(timestamp);
        self.push_version(Versioned {
            value,
            vector_timestamp: timestamp.clone(),
            update_sequence,
        });

        if self.is_conflicting() {
            tracing::debug!(
                aggregate_id = %self.id,
                branches = self.versions.len(),
                "concurrent versions"
            );
        }
    }

    /// Keeps the version selected by a resolution (and anything derived
    /// from it) and moves the branches the resolver rejected to the history.
    ///
    /// Branches the resolver had not seen are concurrent with `timestamp`
    /// and survive. Discarded branches stay available as parents for
    /// updates concurrent with the resolution, so every replica projects
    /// those updates onto the same value whatever the delivery order. If
    /// nothing descends from `selected` the resolution is stale and the
    /// versions are left as they are.
    pub fn apply_resolved(&mut self, selected: &VectorTime, timestamp: &VectorTime) {
        if !self.seen.insert(timestamp.clone()) {
            return;
        }

        let resolution = Resolution {
            selected: selected.clone(),
            timestamp: timestamp.clone(),
        };
        self.resolutions.push(resolution.clone());

        if !self.versions.iter().any(|v| v.vector_timestamp >= *selected) {
            tracing::warn!(aggregate_id = %self.id, %selected, "stale resolution ignored");
            return;
        }

        let (discarded, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.versions)
            .into_iter()
            .partition(|v| resolution.discards(&v.vector_timestamp));
        self.versions = kept;

        tracing::info!(
            aggregate_id = %self.id,
            %selected,
            dropped = discarded.len(),
            "conflict resolved"
        );
        self.history.extend(discarded);
    }

    /// Captures the full state for a snapshot.
    pub fn snapshot(&self) -> AggregateSnapshot<S> {
        let mut seen: Vec<_> = self.seen.iter().cloned().collect();
        seen.sort_by(|a, b| a.tie_break(b));
        AggregateSnapshot {
            versions: self.versions.clone(),
            history: self.history.clone(),
            resolutions: self.resolutions.clone(),
            seen,
        }
    }

    /// Replaces the state with a snapshot taken earlier.
    pub fn restore(&mut self, snapshot: AggregateSnapshot<S>) {
        self.versions = snapshot.versions;
        self.history = snapshot.history;
        self.resolutions = snapshot.resolutions;
        self.seen = snapshot.seen.into_iter().collect();
    }

    /// The most recent known version that causally precedes `timestamp`.
    ///
    /// Versions on branches that a resolution preceding `timestamp`
    /// discarded are skipped: the emitter had already dropped them.
    fn causal_parent(&self, timestamp: &VectorTime) -> Option<&Versioned<S>> {
        let applicable: Vec<&Resolution> = self
            .resolutions
            .iter()
            .filter(|r| r.timestamp.happened_before(timestamp))
            .collect();
        let candidates = self
            .versions
            .iter()
            .chain(self.history.iter())
            .filter(|v| !applicable.iter().any(|r| r.discards(&v.vector_timestamp)));
        Self::latest_preceding(candidates, timestamp)
    }

    fn latest_preceding<'a>(
        candidates: impl Iterator<Item = &'a Versioned<S>>,
        timestamp: &VectorTime,
    ) -> Option<&'a Versioned<S>> {
        let mut maximal: Vec<&Versioned<S>> = Vec::new();
        for candidate in candidates.filter(|v| v.vector_timestamp.happened_before(timestamp)) {
            if maximal
                .iter()
                .any(|m| candidate.vector_timestamp.happened_before(&m.vector_timestamp))
            {
                continue;
            }
            maximal.retain(|m| !m.vector_timestamp.happened_before(&candidate.vector_timestamp));
            maximal.push(candidate);
        }
        maximal
            .into_iter()
            .max_by(|a, b| a.vector_timestamp.tie_break(&b.vector_timestamp))
    }

    /// Moves every current version that precedes `timestamp` to the history.
    fn supersede(&mut self, timestamp: &VectorTime) {
        let (superseded, current): (Vec<_>, Vec<_>) = std::mem::take(&mut self.versions)
            .into_iter()
            .partition(|v| v.vector_timestamp.happened_before(timestamp));
        self.versions = current;
        self.history.extend(superseded);
    }

    fn push_version(&mut self, version: Versioned<S>) {
        self.versions.push(version);
        self.versions
            .sort_by(|a, b| a.vector_timestamp.tie_break(&b.vector_timestamp));
    }
}
