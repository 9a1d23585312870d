//! Fans `iterations` out over `concurrency` workers and merges their results.
//!
//! Two scheduling models:
//!
//! - **Cooperative**: every worker is a future polled by one task through a
//!   [`FuturesUnordered`]; workers interleave only where a backend call
//!   suspends. Returning early drops the remaining worker futures.
//! - **Threads**: one scoped OS thread per worker, each driving its own
//!   current-thread runtime. A shared halt flag stops siblings once any
//!   worker fails.
//!
//! In both models each worker owns its accumulator and RNG stream; results
//! are merged only after every worker has finished (the join barrier), and
//! the reported duration is the wall clock around the whole phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::client::Client;
use crate::config::{ConcurrencyMode, RunConfig};
use crate::dispatcher::{dispatch, KeyCursor};
use crate::error::ScenarioRunError;
use crate::metrics::OperationAccumulator;
use crate::scenario::WeightedSampler;

/// External stop request shared with the caller.
///
/// A request stops the pairing in progress; the runner clears it again
/// before the next pairing starts.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a request once the pairing it stopped has been recorded.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// RNG for one worker: the run seed, on the worker's own stream.
pub fn worker_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Split `n` iterations into `c` shares of `⌈n/c⌉`; trailing workers get
/// what is left (possibly zero).
pub fn partition_iterations(n: u64, c: usize) -> Vec<u64> {
    let c = c.max(1);
    let share = n.div_ceil(c as u64);
    let mut remaining = n;
    (0..c)
        .map(|_| {
            let take = share.min(remaining);
            remaining -= take;
            take
        })
        .collect()
}

pub struct ExecutionResult {
    pub accumulator: OperationAccumulator,
    pub duration: Duration,
}

/// Everything a worker reads; shared by reference across workers.
#[derive(Clone, Copy)]
pub struct WorkerContext<'a> {
    pub client: &'a dyn Client,
    pub sampler: &'a WeightedSampler,
    pub cfg: &'a RunConfig,
    pub abort: &'a AbortSignal,
}

/// Run `iterations` sampled operations on one RNG stream.
///
/// A call that times out, or returns only after the timeout has elapsed,
/// ends the worker with [`ScenarioRunError::Timeout`]; backend errors are
/// only counted.
pub async fn run_worker(
    ctx: WorkerContext<'_>,
    stream: u64,
    iterations: u64,
    halt: &AtomicBool,
) -> Result<OperationAccumulator, ScenarioRunError> {
    let mut cursor = KeyCursor::new(worker_rng(ctx.cfg.seed, stream), ctx.cfg);
    let mut acc = OperationAccumulator::new(ctx.cfg.exact_sample_ceiling);
    let timeout_us = ctx.cfg.op_timeout.as_secs_f64() * 1_000_000.0;

    for _ in 0..iterations {
        if ctx.abort.is_aborted() || halt.load(Ordering::Relaxed) {
            return Err(ScenarioRunError::Aborted);
        }
        let operation = ctx.sampler.sample(cursor.rng());
        let call = dispatch(ctx.client, operation, &mut cursor);
        // The timer only fires at a suspension point; a call that blocks
        // past the deadline is caught by its measured latency instead.
        let sample = match tokio::time::timeout(ctx.cfg.op_timeout, call).await {
            Ok(sample) if sample.latency_us < timeout_us => sample,
            _ => {
                return Err(ScenarioRunError::Timeout {
                    operation,
                    timeout: ctx.cfg.op_timeout,
                })
            }
        };
        acc.record(&sample);
    }
    Ok(acc)
}

/// Run the measurement phase under the configured scheduling model.
///
/// `rt` drives the cooperative model; the threaded model builds one
/// runtime per worker thread.
pub fn execute(
    rt: &Runtime,
    ctx: WorkerContext<'_>,
) -> Result<ExecutionResult, ScenarioRunError> {
    let shares = partition_iterations(ctx.cfg.iterations, ctx.cfg.concurrency);
    debug!(
        backend = ctx.client.name(),
        mode = %ctx.cfg.mode,
        workers = shares.len(),
        iterations = ctx.cfg.iterations,
        "starting measurement"
    );
    match ctx.cfg.mode {
        ConcurrencyMode::Cooperative => run_cooperative(rt, ctx, &shares),
        ConcurrencyMode::Threads => run_threads(ctx, &shares),
    }
}

fn run_cooperative(
    rt: &Runtime,
    ctx: WorkerContext<'_>,
    shares: &[u64],
) -> Result<ExecutionResult, ScenarioRunError> {
    let halt = AtomicBool::new(false);
    let start = Instant::now();
    let accumulators = rt.block_on(async {
        let mut workers: FuturesUnordered<_> = shares
            .iter()
            .enumerate()
            .map(|(idx, &iterations)| run_worker(ctx, idx as u64, iterations, &halt))
            .collect();
        let mut done = Vec::with_capacity(shares.len());
        while let Some(result) = workers.next().await {
            done.push(result?);
        }
        Ok::<_, ScenarioRunError>(done)
    })?;
    let duration = start.elapsed();

    Ok(ExecutionResult {
        accumulator: merge_all(ctx.cfg, accumulators),
        duration,
    })
}

fn run_threads(
    ctx: WorkerContext<'_>,
    shares: &[u64],
) -> Result<ExecutionResult, ScenarioRunError> {
    let halt = AtomicBool::new(false);
    let start = Instant::now();
    let results: Vec<Result<OperationAccumulator, ScenarioRunError>> = thread::scope(|scope| {
        let halt = &halt;
        let handles: Vec<_> = shares
            .iter()
            .enumerate()
            .map(|(idx, &iterations)| {
                let spawned = thread::Builder::new()
                    .name(format!("kvbench-worker-{idx}"))
                    .spawn_scoped(scope, move || {
                        let result = worker_thread(ctx, idx as u64, iterations, halt);
                        if result.is_err() {
                            halt.store(true, Ordering::Relaxed);
                        }
                        result
                    });
                if spawned.is_err() {
                    halt.store(true, Ordering::Relaxed);
                }
                spawned
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(ScenarioRunError::WorkerFailed("worker thread panicked".into()))
                }),
                Err(e) => Err(ScenarioRunError::WorkerFailed(format!(
                    "failed to spawn worker thread: {e}"
                ))),
            })
            .collect()
    });
    let duration = start.elapsed();

    let mut accumulators = Vec::with_capacity(results.len());
    let mut halted = false;
    let mut failure = None;
    for result in results {
        match result {
            Ok(acc) => accumulators.push(acc),
            // Siblings stopped by the halt flag report Aborted; keep the cause.
            Err(ScenarioRunError::Aborted) => halted = true,
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if halted {
        return Err(ScenarioRunError::Aborted);
    }

    Ok(ExecutionResult {
        accumulator: merge_all(ctx.cfg, accumulators),
        duration,
    })
}

fn worker_thread(
    ctx: WorkerContext<'_>,
    stream: u64,
    iterations: u64,
    halt: &AtomicBool,
) -> Result<OperationAccumulator, ScenarioRunError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| ScenarioRunError::WorkerFailed(format!("worker runtime: {e}")))?;
    rt.block_on(run_worker(ctx, stream, iterations, halt))
}

fn merge_all(cfg: &RunConfig, accumulators: Vec<OperationAccumulator>) -> OperationAccumulator {
    let mut merged = OperationAccumulator::new(cfg.exact_sample_ceiling);
    for acc in accumulators {
        merged.merge(acc);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::keyspace::{Entry, EntryStore};
    use crate::adapters::memory_adapter::{memory_client, MemoryStore};
    use crate::adapters::store_client::StoreClient;
    use crate::client::Durability;
    use crate::dataset::populate;
    use crate::error::ClientResult;
    use crate::scenario::{build_sampler, Operation, OperationWeight, WorkloadScenario};
    use rand::RngCore;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

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

    fn run(mode: ConcurrencyMode, concurrency: usize, iterations: u64) -> ExecutionResult {
        let rt = runtime();
        let cfg = RunConfig {
            iterations,
            dataset_size: 100,
            concurrency,
            mode,
            ..Default::default()
        };
        let client = memory_client("memory");
        let scenario = cache_pattern();
        rt.block_on(populate(&client, &scenario, &cfg)).unwrap();
        let sampler = build_sampler(&scenario).unwrap();
        let abort = AbortSignal::new();
        let ctx = WorkerContext {
            client: &client,
            sampler: &sampler,
            cfg: &cfg,
            abort: &abort,
        };
        execute(&rt, ctx).unwrap()
    }

    #[test]
    fn test_partition() {
        assert_eq!(partition_iterations(10, 3), vec![4, 4, 2]);
        assert_eq!(partition_iterations(12, 4), vec![3, 3, 3, 3]);
        assert_eq!(partition_iterations(5, 4), vec![2, 2, 1, 0]);
        assert_eq!(partition_iterations(0, 2), vec![0, 0]);
        assert_eq!(partition_iterations(7, 1), vec![7]);
        for (n, c) in [(1000, 7), (3, 8), (99, 10)] {
            assert_eq!(partition_iterations(n, c).iter().sum::<u64>(), n);
        }
    }

    #[test]
    fn test_worker_streams_differ() {
        let mut a = worker_rng(42, 0);
        let mut b = worker_rng(42, 1);
        let mut a2 = worker_rng(42, 0);
        let x = a.next_u64();
        assert_ne!(x, b.next_u64());
        assert_eq!(x, a2.next_u64());
    }

    #[test]
    fn test_cooperative_accounts_for_every_iteration() {
        let result = run(ConcurrencyMode::Cooperative, 4, 1_000);
        let acc = &result.accumulator;
        assert_eq!(acc.successes() + acc.failures(), 1_000);
        assert_eq!(acc.failures(), 0);
    }

    #[test]
    fn test_threads_account_for_every_iteration() {
        let result = run(ConcurrencyMode::Threads, 3, 1_000);
        let acc = &result.accumulator;
        assert_eq!(acc.total(), 1_000);
        assert_eq!(acc.failures(), 0);
        assert!(result.duration > Duration::ZERO);
    }

    #[test]
    fn test_abort_stops_the_run() {
        let rt = runtime();
        let cfg = RunConfig {
            iterations: 100,
            dataset_size: 10,
            ..Default::default()
        };
        let client = memory_client("memory");
        let sampler = build_sampler(&cache_pattern()).unwrap();
        let abort = AbortSignal::new();
        abort.abort();
        let ctx = WorkerContext {
            client: &client,
            sampler: &sampler,
            cfg: &cfg,
            abort: &abort,
        };
        assert!(matches!(execute(&rt, ctx), Err(ScenarioRunError::Aborted)));
    }

    #[test]
    fn test_timeout_is_fatal_in_both_modes() {
        for mode in [ConcurrencyMode::Cooperative, ConcurrencyMode::Threads] {
            let rt = runtime();
            let cfg = RunConfig {
                iterations: 20,
                dataset_size: 10,
                concurrency: 2,
                mode,
                op_timeout: Duration::from_millis(10),
                ..Default::default()
            };
            let client = memory_client("slow").with_round_trip(Duration::from_millis(200));
            let sampler = build_sampler(&cache_pattern()).unwrap();
            let abort = AbortSignal::new();
            let ctx = WorkerContext {
                client: &client,
                sampler: &sampler,
                cfg: &cfg,
                abort: &abort,
            };
            match execute(&rt, ctx) {
                Err(ScenarioRunError::Timeout { timeout, .. }) => {
                    assert_eq!(timeout, Duration::from_millis(10))
                }
                other => panic!("{mode}: expected timeout, got {:?}", other.map(|r| r.duration)),
            }
        }
    }

    /// Memory store whose reads block the calling thread.
    struct StallingStore {
        inner: MemoryStore,
        stall: Duration,
    }

    impl EntryStore for StallingStore {
        fn load(&mut self, key: &str) -> ClientResult<Option<Entry>> {
            thread::sleep(self.stall);
            self.inner.load(key)
        }
        fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()> {
            self.inner.store(key, entry)
        }
        fn remove(&mut self, key: &str) -> ClientResult<bool> {
            self.inner.remove(key)
        }
        fn clear(&mut self) -> ClientResult<()> {
            self.inner.clear()
        }
    }

    #[test]
    fn test_blocking_call_past_deadline_times_out() {
        let get_only =
            WorkloadScenario::new("get", vec![OperationWeight::new(Operation::Get, 100.0)])
                .unwrap();
        for mode in [ConcurrencyMode::Cooperative, ConcurrencyMode::Threads] {
            let rt = runtime();
            let cfg = RunConfig {
                iterations: 5,
                dataset_size: 10,
                mode,
                op_timeout: Duration::from_millis(10),
                ..Default::default()
            };
            let store = StallingStore {
                inner: MemoryStore::default(),
                stall: Duration::from_millis(60),
            };
            let client = StoreClient::new("stalling", "test", Durability::Volatile, store);
            let sampler = build_sampler(&get_only).unwrap();
            let abort = AbortSignal::new();
            let ctx = WorkerContext {
                client: &client,
                sampler: &sampler,
                cfg: &cfg,
                abort: &abort,
            };
            assert!(
                matches!(
                    execute(&rt, ctx),
                    Err(ScenarioRunError::Timeout {
                        operation: Operation::Get,
                        ..
                    })
                ),
                "{mode}: blocking call was not reported as a timeout"
            );
        }
    }

    #[test]
    fn test_abort_signal_reset() {
        let abort = AbortSignal::new();
        let shared = abort.clone();
        shared.abort();
        assert!(abort.is_aborted());
        abort.reset();
        assert!(!shared.is_aborted());
    }
}
