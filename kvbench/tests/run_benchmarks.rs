//! End-to-end runs: scenario file → runner → report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kvbench::adapters::keyspace::{Entry, EntryStore};
use kvbench::adapters::memory_adapter::{memory_client, MemoryStore};
use kvbench::adapters::store_client::StoreClient;
use kvbench::adapters::{open_backend, BackendKind};
use kvbench::error::{ClientError, ClientResult};
use kvbench::report::{self, BackendInfo, ReportFormat, ReportMetadata};
use kvbench::scenario::{load_scenarios, select_scenarios};
use kvbench::{
    run_benchmarks, BackendOutcome, Client, ConcurrencyMode, Durability, RunConfig, Winner,
};
use tempfile::TempDir;

fn scenario_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios/default.yaml")
}

fn small_config() -> RunConfig {
    RunConfig {
        iterations: 1_000,
        dataset_size: 200,
        warmup_iterations: 100,
        ..Default::default()
    }
}

/// Store whose PING always fails, standing in for a backend that is down.
#[derive(Default)]
struct DownStore(MemoryStore);

impl EntryStore for DownStore {
    fn load(&mut self, key: &str) -> ClientResult<Option<Entry>> {
        self.0.load(key)
    }
    fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()> {
        self.0.store(key, entry)
    }
    fn remove(&mut self, key: &str) -> ClientResult<bool> {
        self.0.remove(key)
    }
    fn clear(&mut self) -> ClientResult<()> {
        self.0.clear()
    }
    fn ping(&mut self) -> ClientResult<()> {
        Err(ClientError::Connection("connection refused".into()))
    }
}

#[test]
fn test_cache_pattern_memory_vs_sqlite() {
    let scenarios = select_scenarios(
        load_scenarios(&scenario_file()).unwrap(),
        Some("cache_pattern"),
    )
    .unwrap();
    let tmp = TempDir::new().unwrap();
    let a = open_backend(&BackendKind::Memory, "memory", tmp.path(), Duration::ZERO).unwrap();
    let b = open_backend(
        &BackendKind::Sqlite { path: None },
        "sqlite",
        tmp.path(),
        Duration::ZERO,
    )
    .unwrap();

    let mut progress = Vec::new();
    let report = run_benchmarks(small_config(), &scenarios, a, b, |sc| {
        progress.push(sc.scenario_name.clone())
    })
    .unwrap();

    assert_eq!(progress, vec!["cache_pattern".to_string()]);
    assert_eq!(report.summary.total_scenarios, 1);
    assert_eq!(report.summary.completed_a, 1);
    assert_eq!(report.summary.completed_b, 1);
    let sc = &report.scenarios[0];
    assert_eq!(sc.scenario_name, "cache_pattern");
    for outcome in [&sc.backend_a, &sc.backend_b] {
        let m = outcome.metrics().unwrap();
        assert_eq!(m.total_ops(), 1_000);
        assert!(m.throughput_ops_sec > 0.0);
        assert!(m.min_us <= m.p50_us && m.p50_us <= m.p95_us && m.p95_us <= m.p99_us);
        assert!(m.p99_us <= m.max_us);
    }
    assert!(sc.comparison.pct_diff.is_some());
    assert!(sc.comparison.winner.is_some());
    assert_eq!(report.metadata.backend_b.durability, Durability::FileBacked);
}

#[test]
fn test_unreachable_backend_is_absent() {
    let scenarios = select_scenarios(
        load_scenarios(&scenario_file()).unwrap(),
        Some("cache_pattern"),
    )
    .unwrap();
    let a: Arc<dyn Client> = Arc::new(memory_client("memory"));
    let b: Arc<dyn Client> = Arc::new(StoreClient::new(
        "remote",
        "test",
        Durability::Volatile,
        DownStore::default(),
    ));

    let report = run_benchmarks(small_config(), &scenarios, a, b, |_| {}).unwrap();

    let sc = &report.scenarios[0];
    assert!(sc.backend_a.metrics().is_some());
    assert!(matches!(sc.backend_b, BackendOutcome::Absent { .. }));
    assert_eq!(sc.comparison.winner, Some(Winner::A));
    assert_eq!(sc.comparison.pct_diff, None);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["scenarios"][0]["backend_b"]["status"], "absent");
    assert_eq!(json["scenarios"][0]["backend_b"]["reason"]["kind"], "unreachable");
    assert_eq!(json["scenarios"][0]["backend_a"]["status"], "completed");
}

#[test]
fn test_every_default_scenario_completes_threaded() {
    let scenarios = load_scenarios(&scenario_file()).unwrap();
    let cfg = RunConfig {
        iterations: 400,
        dataset_size: 50,
        warmup_iterations: 20,
        concurrency: 4,
        mode: ConcurrencyMode::Threads,
        ..Default::default()
    };
    let a: Arc<dyn Client> = Arc::new(memory_client("memory-a"));
    let b: Arc<dyn Client> = Arc::new(memory_client("memory-b"));

    let report = run_benchmarks(cfg, &scenarios, a, b, |_| {}).unwrap();

    assert_eq!(report.scenarios.len(), scenarios.len());
    for (sc, expected) in report.scenarios.iter().zip(&scenarios) {
        assert_eq!(sc.scenario_name, expected.name);
        assert_eq!(sc.description, expected.description);
        for outcome in [&sc.backend_a, &sc.backend_b] {
            let m = outcome
                .metrics()
                .unwrap_or_else(|| panic!("{} absent for {}", outcome.backend(), sc.scenario_name));
            assert_eq!(m.total_ops(), 400);
        }
    }
}

#[test]
fn test_report_rendering_is_idempotent() {
    let scenarios = select_scenarios(
        load_scenarios(&scenario_file()).unwrap(),
        Some("cache_pattern,leaderboard"),
    )
    .unwrap();
    let a: Arc<dyn Client> = Arc::new(memory_client("memory-a"));
    let b: Arc<dyn Client> = Arc::new(memory_client("memory-b"));
    let cfg = small_config();
    let metadata = ReportMetadata::new(
        &cfg,
        BackendInfo::of(a.as_ref()),
        BackendInfo::of(b.as_ref()),
    )
    .with_timestamp("2026-01-01T00:00:00Z");
    let runner = kvbench::Runner::new(cfg, a, b).unwrap();
    let report = report::generate(metadata, runner.run_all(&scenarios, |_| {}));

    for format in [ReportFormat::Json, ReportFormat::Markdown, ReportFormat::Table] {
        assert_eq!(report.render(format).unwrap(), report.render(format).unwrap());
    }
    let again = report::generate(report.metadata.clone(), report.scenarios.clone());
    assert_eq!(report.to_markdown(), again.to_markdown());
    assert_eq!(report.to_json().unwrap(), again.to_json().unwrap());
}
