//! # Tool Bus Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Schema validation | typed decode of one payload |
//! | Broadcast fan-out | validate + authorize + deliver to N subscribers |
//! | Targeted send | allow-list check on a restricted tool |
//!
//! ```bash
//! cargo bench --package workbench-tests --bench dispatch_benchmarks -- fan-out
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use workbench_bus::{ActivityLog, SchemaRegistry, ToolBus, ToolCatalog, ToolDescriptor};
use workbench_types::event_types as types;
use workbench_types::Message;

fn catalog() -> ToolCatalog {
    ToolCatalog::new()
        .with(ToolDescriptor::new("experiments", "Experiments"))
        .with(ToolDescriptor::new("deployment", "Deployment").allow_sources(["experiments"]))
}

fn bench_schema_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let registry = SchemaRegistry::new(Arc::new(ActivityLog::new(100)));

    let samples = [
        (
            "data_load",
            Message::broadcast(
                types::DATA_LOAD,
                json!({"datasetId": "iris", "format": "csv", "rowCount": 150}),
                "data-browser",
            ),
        ),
        (
            "model_export",
            Message::broadcast(
                types::MODEL_EXPORT,
                json!({"modelId": "m1", "format": "onnx", "accuracy": 0.93}),
                "experiments",
            ),
        ),
        (
            "unrecognized",
            Message::broadcast("PLUGIN_PING", json!({"plugin": "profiler"}), "profiler"),
        ),
    ];

    for (name, message) in &samples {
        group.bench_function(*name, |b| b.iter(|| black_box(registry.validate(message))));
    }
    group.finish();
}

fn bench_broadcast_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan-out");

    for subscribers in [1usize, 10, 100] {
        let bus = ToolBus::with_directory(Arc::new(catalog())).expect("bus");
        let hits = Arc::new(AtomicU64::new(0));
        let _subscriptions: Vec<_> = (0..subscribers)
            .map(|_| {
                let hits = hits.clone();
                bus.subscribe(types::EXPERIMENT_METRIC, move |_| {
                    hits.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
            })
            .collect();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("broadcast", subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    bus.broadcast(
                        types::EXPERIMENT_METRIC,
                        json!({"experimentId": "e1", "name": "loss", "value": 0.2, "step": 1}),
                        "experiments",
                    )
                })
            },
        );
        black_box(hits.load(Ordering::Relaxed));
    }
    group.finish();
}

fn bench_targeted_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("targeted");
    let bus = ToolBus::with_directory(Arc::new(catalog())).expect("bus");
    let _deployment = bus.subscribe(types::MODEL_EXPORT, |_| Ok(()));
    let export = json!({"modelId": "m1", "format": "onnx", "accuracy": 0.93});

    group.bench_function("allowed", |b| {
        b.iter(|| bus.send_to_tool("deployment", types::MODEL_EXPORT, export.clone(), "experiments"))
    });
    group.bench_function("denied", |b| {
        b.iter(|| {
            let id = bus.send_to_tool("deployment", types::MODEL_EXPORT, export.clone(), "notebook");
            bus.take_dead_letter(id)
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_schema_validation,
    bench_broadcast_fan_out,
    bench_targeted_send
);
criterion_main!(benches);
