//! kvbench: weighted-workload benchmarks comparing two key-value backends.
//!
//! A run loads YAML workload scenarios, drives each one through backend A
//! and then backend B (populate, warm up, measure), aggregates latency and
//! throughput per pairing, and renders a comparison report.

pub mod adapters;
pub mod client;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod warmup;

use std::sync::Arc;

pub use client::{Client, Durability};
pub use compare::{BackendOutcome, ScenarioComparison, Winner};
pub use config::{ConcurrencyMode, RunConfig};
pub use error::{BenchError, BenchResult};
pub use metrics::BackendMetrics;
pub use report::{BenchmarkReport, ReportFormat};
pub use runner::Runner;
pub use scenario::{Operation, WorkloadScenario};

// ────────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────────

/// Run every scenario against both backends and build the report.
///
/// `on_scenario` sees each comparison as soon as it is available. Pairing
/// failures end up as absent results inside the report; only invalid
/// settings or a runtime that cannot start return an error.
pub fn run_benchmarks(
    cfg: RunConfig,
    scenarios: &[WorkloadScenario],
    backend_a: Arc<dyn Client>,
    backend_b: Arc<dyn Client>,
    on_scenario: impl FnMut(&ScenarioComparison),
) -> BenchResult<BenchmarkReport> {
    let metadata = report::ReportMetadata::new(
        &cfg,
        report::BackendInfo::of(backend_a.as_ref()),
        report::BackendInfo::of(backend_b.as_ref()),
    );
    let runner = Runner::new(cfg, backend_a, backend_b)?;
    let results = runner.run_all(scenarios, on_scenario);
    Ok(report::generate(metadata, results))
}
