use criterion::{Criterion, criterion_group, criterion_main};
use event_log::{AggregateId, AppendOptions, EventLog, InMemoryEventLog, NewEvent, VectorTime};

fn new_event(aggregate_id: &str) -> NewEvent {
    NewEvent::from_payload(
        AggregateId::new(aggregate_id),
        "Order",
        "OrderItemAdded",
        &serde_json::json!({"order_id": aggregate_id, "item": "apple"}),
    )
    .unwrap()
}

fn bench_append(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new("A");

    c.bench_function("event_log/append", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.append(new_event("O1"), AppendOptions::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_replicate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let source = InMemoryEventLog::new("A");
    rt.block_on(async {
        for i in 0..1_000 {
            source
                .append(new_event(&format!("O{}", i % 10)), AppendOptions::new())
                .await
                .unwrap();
        }
    });

    c.bench_function("event_log/replicate_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let target = InMemoryEventLog::new("B");
                target.replicate_from(&source).await.unwrap();
            });
        });
    });
}

fn bench_vector_time_compare(c: &mut Criterion) {
    let a = VectorTime::from_entries([("A", 30), ("B", 12), ("C", 7)]);
    let b = VectorTime::from_entries([("A", 29), ("B", 13), ("C", 7)]);

    c.bench_function("event_log/vector_time_compare", |bench| {
        bench.iter(|| std::hint::black_box(a.compare(&b)));
    });
}

criterion_group!(
    benches,
    bench_append,
    bench_replicate,
    bench_vector_time_compare
);
criterion_main!(benches);
