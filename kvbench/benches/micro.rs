//! Criterion microbenchmarks for the engine's hot paths: operation
//! sampling, latency accumulation and single-operation dispatch against
//! the memory and SQLite adapters.
//!
//! Run with: `cargo bench --bench micro`

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kvbench::adapters::{open_backend, BackendKind};
use kvbench::dataset::populate;
use kvbench::dispatcher::{dispatch, KeyCursor};
use kvbench::executor::worker_rng;
use kvbench::metrics::{aggregate, OperationAccumulator};
use kvbench::scenario::{build_sampler, Operation, OperationWeight, WorkloadScenario};
use kvbench::{Client, RunConfig};
use rand::Rng;
use tempfile::TempDir;

fn cache_pattern() -> WorkloadScenario {
    WorkloadScenario::new(
        "cache_pattern",
        vec![
            OperationWeight::new(Operation::Get, 70.0),
            OperationWeight::new(Operation::Set, 20.0),
            OperationWeight::new(Operation::Incr, 5.0),
            OperationWeight::new(Operation::Del, 5.0),
        ],
    )
    .unwrap()
}

fn bench_sampler(c: &mut Criterion) {
    let sampler = build_sampler(&cache_pattern()).unwrap();
    let mut rng = worker_rng(42, 0);
    c.bench_function("sampler_select", |b| {
        b.iter(|| black_box(sampler.sample(&mut rng)));
    });
}

fn bench_accumulator(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for ceiling in [1_000usize, 100_000] {
        group.bench_with_input(
            BenchmarkId::new("ceiling", ceiling),
            &ceiling,
            |b, &ceiling| {
                let mut rng = worker_rng(7, 0);
                let latencies: Vec<f64> = (0..10_000)
                    .map(|_| rng.gen_range(1.0..5_000.0))
                    .collect();
                b.iter(|| {
                    let mut acc = OperationAccumulator::new(ceiling);
                    for &us in &latencies {
                        acc.record_success(us);
                    }
                    black_box(aggregate(acc, Duration::from_secs(1)))
                });
            },
        );
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let cfg = RunConfig {
        dataset_size: 1_000,
        ..Default::default()
    };
    let scenario = cache_pattern();

    for kind in [BackendKind::Memory, BackendKind::Sqlite { path: None }] {
        let tmp = TempDir::new().unwrap();
        let client: Arc<dyn Client> =
            open_backend(&kind, kind.label(), tmp.path(), Duration::ZERO).unwrap();
        rt.block_on(populate(client.as_ref(), &scenario, &cfg)).unwrap();

        for op in [Operation::Get, Operation::Set] {
            group.bench_function(BenchmarkId::new(kind.label(), op), |b| {
                let mut cursor = KeyCursor::new(worker_rng(42, 0), &cfg);
                b.iter(|| black_box(rt.block_on(dispatch(client.as_ref(), op, &mut cursor))));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_sampler, bench_accumulator, bench_dispatch);
criterion_main!(benches);
