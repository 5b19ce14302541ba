//! Projection processor for feeding logged events to projections.

use std::sync::Arc;

use event_log::EventLog;
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers the events of one replica's log to projections.
///
/// - Catch-up: streams the log and hands each projection the events past
///   its position
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<L: EventLog> {
    log: Arc<L>,
    projections: Vec<Box<dyn Projection>>,
}

impl<L: EventLog> ProjectionProcessor<L> {
    pub fn new(log: Arc<L>) -> Self {
        Self {
            log,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the log and delivers every event a projection has not
    /// processed yet. Returns the number of deliveries.
    #[tracing::instrument(skip(self), fields(replica = %self.log.replica_id()))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.log.stream_all_events().await?;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;

            for projection in &self.projections {
                if projection.position().await.is_behind(event.sequence_nr) {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed").increment(1);
                }
            }
        }

        tracing::info!(delivered, "catch-up complete");

        Ok(delivered)
    }

    /// Resets all projections and replays the whole log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_log::{AppendOptions, EventEnvelope, InMemoryEventLog, NewEvent};
    use tokio::sync::RwLock;

    /// Counts delivered events.
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::start())),
            }
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance_to(event.sequence_nr);
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::start();
            Ok(())
        }
    }

    async fn log_with_events(n: usize) -> Arc<InMemoryEventLog> {
        let log = Arc::new(InMemoryEventLog::new("A"));
        for _ in 0..n {
            let event = NewEvent::from_payload(
                AggregateId::new("O1"),
                "Order",
                "TestEvent",
                &serde_json::json!({"test": true}),
            )
            .unwrap();
            log.append(event, AppendOptions::new()).await.unwrap();
        }
        log
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events() {
        let log = log_with_events(3).await;
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(log);
        processor.register(Box::new(projection));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(*count_ref.read().await, 3);
    }

    #[tokio::test]
    async fn test_catch_up_skips_already_processed() {
        let log = log_with_events(2).await;
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(Arc::clone(&log));
        processor.register(Box::new(projection));
        processor.run_catch_up().await.unwrap();

        let event = NewEvent::from_payload(
            AggregateId::new("O1"),
            "Order",
            "TestEvent",
            &serde_json::json!({"test": true}),
        )
        .unwrap();
        log.append(event, AppendOptions::new()).await.unwrap();

        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(*count_ref.read().await, 3);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let log = log_with_events(2).await;
        let projection = CountingProjection::new();
        let count_ref = Arc::clone(&projection.count);
        let pos_ref = Arc::clone(&projection.position);

        let mut processor = ProjectionProcessor::new(log);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(*count_ref.read().await, 2);
        assert_eq!(pos_ref.read().await.sequence_nr.as_u64(), 2);
    }
}
