//! Drives every scenario through both backends and compares the results.
//!
//! Per scenario and backend: ping → populate → warmup → measure → aggregate.
//! Backend A always runs before backend B, and scenarios run in file order.
//! A failure in one pairing is recorded as an absent result and the run
//! moves on.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::client::Client;
use crate::compare::{AbsentReason, BackendOutcome, ScenarioComparison};
use crate::config::RunConfig;
use crate::dataset::populate;
use crate::error::{BenchError, BenchResult, ClientError, ScenarioRunError};
use crate::executor::{execute, AbortSignal, WorkerContext};
use crate::metrics::{aggregate, BackendMetrics};
use crate::scenario::{build_sampler, WorkloadScenario};
use crate::warmup::warmup;

pub struct Runner {
    rt: Runtime,
    cfg: RunConfig,
    backend_a: Arc<dyn Client>,
    backend_b: Arc<dyn Client>,
    abort: AbortSignal,
}

impl Runner {
    pub fn new(
        cfg: RunConfig,
        backend_a: Arc<dyn Client>,
        backend_b: Arc<dyn Client>,
    ) -> BenchResult<Self> {
        cfg.validate()?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| BenchError::Runtime(format!("failed to build runtime: {e}")))?;
        Ok(Self {
            rt,
            cfg,
            backend_a,
            backend_b,
            abort: AbortSignal::new(),
        })
    }

    /// Handle that stops the pairing in progress. Later pairings run as
    /// usual.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Run `scenarios` in order, handing each result to `on_scenario` as
    /// soon as both backends are done.
    pub fn run_all(
        &self,
        scenarios: &[WorkloadScenario],
        mut on_scenario: impl FnMut(&ScenarioComparison),
    ) -> Vec<ScenarioComparison> {
        scenarios
            .iter()
            .map(|s| {
                let result = self.run_scenario(s);
                on_scenario(&result);
                result
            })
            .collect()
    }

    pub fn run_scenario(&self, scenario: &WorkloadScenario) -> ScenarioComparison {
        let a = self.run_backend(scenario, self.backend_a.as_ref());
        let b = self.run_backend(scenario, self.backend_b.as_ref());
        let result = ScenarioComparison::new(&scenario.name, scenario.description.clone(), a, b);
        info!(
            scenario = %scenario.name,
            winner = ?result.comparison.winner,
            verdict = %result.comparison.verdict,
            "scenario compared"
        );
        result
    }

    /// One scenario against one backend, folded into an outcome.
    pub fn run_backend(&self, scenario: &WorkloadScenario, client: &dyn Client) -> BackendOutcome {
        let name = client.name().to_string();
        match self.run_pairing(scenario, client) {
            Ok(metrics) => {
                info!(
                    scenario = %scenario.name,
                    backend = %name,
                    throughput = metrics.throughput_ops_sec,
                    p50_us = metrics.p50_us,
                    p99_us = metrics.p99_us,
                    error_rate = metrics.error_rate,
                    approximate = metrics.approximate,
                    "measurement complete"
                );
                if metrics.is_degraded() {
                    warn!(
                        scenario = %scenario.name,
                        backend = %name,
                        error_rate = metrics.error_rate,
                        first_error = metrics.first_error.as_deref().unwrap_or(""),
                        "degraded run"
                    );
                }
                BackendOutcome::completed(name, metrics)
            }
            Err(PairingError::NoSamples { failures }) => {
                warn!(
                    scenario = %scenario.name,
                    backend = %name,
                    failures,
                    "no successful operations"
                );
                BackendOutcome::absent(name, AbsentReason::NoSamples { failures })
            }
            Err(PairingError::Run(ScenarioRunError::Aborted)) => {
                warn!(scenario = %scenario.name, backend = %name, "pairing aborted");
                self.abort.reset();
                BackendOutcome::absent(name, AbsentReason::Aborted)
            }
            Err(PairingError::Run(err)) => {
                warn!(scenario = %scenario.name, backend = %name, error = %err, "backend skipped");
                BackendOutcome::absent(name, err.into())
            }
        }
    }

    fn run_pairing(
        &self,
        scenario: &WorkloadScenario,
        client: &dyn Client,
    ) -> Result<BackendMetrics, PairingError> {
        let cfg = &self.cfg;
        let sampler = build_sampler(scenario)
            .map_err(|e| ScenarioRunError::Setup(ClientError::InvalidArgument(e.to_string())))?;
        self.check_abort()?;

        self.rt
            .block_on(async { tokio::time::timeout(cfg.op_timeout, client.ping()).await })
            .map_err(|_| ClientError::Connection("PING timed out".into()))
            .and_then(|r| r)
            .map_err(ScenarioRunError::Connection)?;

        self.check_abort()?;
        let started = Instant::now();
        let population = self
            .rt
            .block_on(populate(client, scenario, cfg))
            .map_err(ScenarioRunError::Setup)?;

        let ctx = WorkerContext {
            client,
            sampler: &sampler,
            cfg,
            abort: &self.abort,
        };
        self.rt.block_on(warmup(ctx))?;

        let execution = execute(&self.rt, ctx)?;
        let failures = execution.accumulator.failures();
        info!(
            scenario = %scenario.name,
            backend = client.name(),
            populated_keys = population.total_keys(),
            populated_elements = population.elements,
            populate_ms = population.duration.as_millis() as u64,
            measured_ms = execution.duration.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "pairing finished"
        );
        aggregate(execution.accumulator, execution.duration)
            .ok_or(PairingError::NoSamples { failures })
    }

    fn check_abort(&self) -> Result<(), ScenarioRunError> {
        if self.abort.is_aborted() {
            Err(ScenarioRunError::Aborted)
        } else {
            Ok(())
        }
    }
}

enum PairingError {
    Run(ScenarioRunError),
    NoSamples { failures: u64 },
}

impl From<ScenarioRunError> for PairingError {
    fn from(err: ScenarioRunError) -> Self {
        PairingError::Run(err)
    }
}
