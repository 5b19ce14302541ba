//! Integration tests for in-memory logs exchanging events.

use std::sync::Arc;

use event_log::{
    AggregateId, AppendOptions, CausalOrdering, EventLog, EventLogExt, InMemoryEventLog,
    NewEvent, ReplicaId, SequenceNr,
};
use futures_util::StreamExt;

fn order_event(id: &str, event_type: &str) -> NewEvent {
    NewEvent::from_payload(
        AggregateId::new(id),
        "Order",
        event_type,
        &serde_json::json!({ "order_id": id }),
    )
    .unwrap()
}

mod relay {
    use super::*;

    #[tokio::test]
    async fn events_travel_through_intermediate_replica() {
        let a = InMemoryEventLog::new("A");
        let b = InMemoryEventLog::new("B");
        let c = InMemoryEventLog::new("C");

        let created = a
            .append(order_event("O1", "OrderCreated"), AppendOptions::expect_new())
            .await
            .unwrap();

        assert_eq!(b.replicate_from(&a).await.unwrap(), 1);
        assert_eq!(c.replicate_from(&b).await.unwrap(), 1);
        assert_eq!(c.replicate_from(&a).await.unwrap(), 0);

        let at_c = c.replay(&AggregateId::new("O1")).await.unwrap();
        assert_eq!(at_c.len(), 1);
        assert_eq!(at_c[0].event_id, created.event_id);
        assert_eq!(at_c[0].emitter, ReplicaId::new("A"));
        assert_eq!(at_c[0].vector_timestamp, created.vector_timestamp);
    }

    #[tokio::test]
    async fn write_after_replication_dominates_replicated_event() {
        let a = InMemoryEventLog::new("A");
        let b = InMemoryEventLog::new("B");

        let created = a
            .append(order_event("O1", "OrderCreated"), AppendOptions::new())
            .await
            .unwrap();
        b.replicate_from(&a).await.unwrap();

        let last = b.last_sequence_nr().await.unwrap();
        let update = b
            .append(
                order_event("O1", "OrderItemAdded"),
                AppendOptions::expect_sequence(last),
            )
            .await
            .unwrap();

        assert_eq!(
            created.vector_timestamp.compare(&update.vector_timestamp),
            CausalOrdering::Before
        );
        assert!(created.vector_timestamp.happened_before(&update.vector_timestamp));
    }

    #[tokio::test]
    async fn replicated_events_get_local_sequence_numbers() {
        let a = InMemoryEventLog::new("A");
        let b = InMemoryEventLog::new("B");

        b.append(order_event("O2", "OrderCreated"), AppendOptions::new())
            .await
            .unwrap();
        a.append(order_event("O1", "OrderCreated"), AppendOptions::new())
            .await
            .unwrap();
        b.replicate_from(&a).await.unwrap();

        let mut stream = b.stream_all_events().await.unwrap();
        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            let event = event.unwrap();
            seen.push((event.sequence_nr, event.aggregate_id));
        }

        assert_eq!(
            seen,
            vec![
                (SequenceNr::new(1), AggregateId::new("O2")),
                (SequenceNr::new(2), AggregateId::new("O1")),
            ]
        );
    }
}

mod trait_objects {
    use super::*;

    #[tokio::test]
    async fn log_is_usable_behind_dyn_trait() {
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new("A"));
        let mut progress = log.subscribe();

        log.append(order_event("O1", "OrderCreated"), AppendOptions::new())
            .await
            .unwrap();

        progress.changed().await.unwrap();
        assert_eq!(*progress.borrow(), SequenceNr::new(1));
        assert_eq!(log.replica_id(), &ReplicaId::new("A"));

        let (snapshot, events) = log.load_aggregate(&AggregateId::new("O1")).await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(events.len(), 1);
    }
}
