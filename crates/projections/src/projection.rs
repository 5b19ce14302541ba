//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_log::{EventEnvelope, SequenceNr};

use crate::Result;

/// The last log position a projection has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub sequence_nr: SequenceNr,
}

impl ProjectionPosition {
    /// The position before the first event.
    pub fn start() -> Self {
        Self {
            sequence_nr: SequenceNr::initial(),
        }
    }

    /// Moves the position to `sequence_nr`.
    pub fn advance_to(&self, sequence_nr: SequenceNr) -> Self {
        Self {
            sequence_nr: self.sequence_nr.max(sequence_nr),
        }
    }

    /// Returns true if the event at `sequence_nr` has not been processed.
    pub fn is_behind(&self, sequence_nr: SequenceNr) -> bool {
        self.sequence_nr < sequence_nr
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.sequence_nr)
    }
}

/// A projection that processes logged events into a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event and advances the position to it.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
