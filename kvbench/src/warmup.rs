//! Unmeasured iterations run before measurement.

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::debug;

use crate::error::ScenarioRunError;
use crate::executor::{run_worker, WorkerContext};

/// RNG stream reserved for warmup; measurement workers use `0..concurrency`.
pub const WARMUP_STREAM: u64 = u64::MAX;

/// Run `warmup_iterations` scenario-weighted operations on one worker.
///
/// Samples and operation failures are discarded. A timeout or abort still
/// ends the pairing.
pub async fn warmup(ctx: WorkerContext<'_>) -> Result<(), ScenarioRunError> {
    let iterations = ctx.cfg.warmup_iterations;
    if iterations == 0 {
        return Ok(());
    }
    let start = Instant::now();
    let halt = AtomicBool::new(false);
    let acc = run_worker(ctx, WARMUP_STREAM, iterations, &halt).await?;
    debug!(
        backend = ctx.client.name(),
        iterations,
        failures = acc.failures(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "warmup finished"
    );
    Ok(())
}
