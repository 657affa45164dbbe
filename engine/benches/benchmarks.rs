//! Performance benchmarks for tether-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tether_engine::{
    checksum, diff_fields, Agent, ChangeAction, ChangeRecord, Snapshot,
};

fn sample_payload(fields: usize) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = (0..fields)
        .map(|i| (format!("field_{i}"), json!(format!("value {i}"))))
        .collect();
    serde_json::Value::Object(map)
}

fn sample_history(changes: usize) -> Vec<ChangeRecord> {
    let mut records = vec![ChangeRecord::new(
        "ch_0",
        "tasks",
        "rec_1",
        ChangeAction::Create,
        serde_json::Value::Null,
        sample_payload(8),
        None,
        Agent::System,
        1000,
    )];
    for i in 1..changes {
        records.push(ChangeRecord::new(
            format!("ch_{i}"),
            "tasks",
            "rec_1",
            ChangeAction::Update,
            json!(format!("value {}", i - 1)),
            json!(format!("value {i}")),
            Some(format!("field_{}", i % 8)),
            Agent::System,
            1000 + i as u64,
        ));
    }
    records
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for size in [4, 32, 128].iter() {
        group.bench_with_input(BenchmarkId::new("flat_object", size), size, |b, &size| {
            let value = sample_payload(size);
            b.iter(|| checksum(black_box(&value)))
        });
    }

    group.bench_function("nested_object", |b| {
        let value = json!({
            "config": {"retries": 3, "timeouts": {"read": 30, "write": 60}},
            "tags": ["sync", "rewind", "superposition"],
            "owner": {"name": "Alice", "team": {"id": 7, "scale": "team"}},
        });
        b.iter(|| checksum(black_box(&value)))
    });

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for size in [8, 64].iter() {
        group.bench_with_input(BenchmarkId::new("half_changed", size), size, |b, &size| {
            let before = sample_payload(size);
            let mut after = before.clone();
            if let Some(map) = after.as_object_mut() {
                for i in 0..size / 2 {
                    map.insert(format!("field_{i}"), json!("changed"));
                }
            }
            b.iter(|| diff_fields(black_box(&before), black_box(&after)))
        });
    }

    group.finish();
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("replay", size), size, |b, &size| {
            let records = sample_history(size);
            let at = 1000 + size as u64;
            b.iter(|| Snapshot::fold(black_box("rec_1"), black_box(&records), black_box(at)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_checksum, bench_diff, bench_fold);
criterion_main!(benches);
