//! Run settings shared by every scenario/backend pairing of one invocation.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// Scheduling model of the concurrency executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One task multiplexes all workers; they suspend only at backend calls.
    #[default]
    Cooperative,
    /// One OS thread per worker, each driving its own single-threaded runtime.
    Threads,
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cooperative => write!(f, "cooperative"),
            Self::Threads => write!(f, "threads"),
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    /// Measured operations per scenario/backend pairing.
    pub iterations: u64,
    /// Keys populated per required data type.
    pub dataset_size: u64,
    pub concurrency: usize,
    pub mode: ConcurrencyMode,
    pub warmup_iterations: u64,
    #[serde(rename = "op_timeout_secs", serialize_with = "as_secs")]
    pub op_timeout: Duration,
    pub seed: u64,
    /// Samples kept exactly before the accumulator spills into a histogram.
    pub exact_sample_ceiling: usize,
    pub value_size: usize,
    /// Elements per hash/list/set/sorted set/stream key.
    pub collection_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 50_000,
            dataset_size: 10_000,
            concurrency: 1,
            mode: ConcurrencyMode::Cooperative,
            warmup_iterations: 1_000,
            op_timeout: Duration::from_secs(30),
            seed: 42,
            exact_sample_ceiling: 100_000,
            value_size: 100,
            collection_size: 10,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::InvalidSetting(msg.to_string()));
        if self.iterations == 0 {
            return invalid("iterations must be at least 1");
        }
        if self.dataset_size == 0 {
            return invalid("dataset size must be at least 1");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.op_timeout.is_zero() {
            return invalid("operation timeout must be positive");
        }
        if self.exact_sample_ceiling == 0 {
            return invalid("exact sample ceiling must be at least 1");
        }
        if self.collection_size == 0 {
            return invalid("collection size must be at least 1");
        }
        if self.value_size < crate::dataset::VALUE_PREFIX.len() {
            return Err(ConfigError::InvalidSetting(format!(
                "value size must be at least {} bytes",
                crate::dataset::VALUE_PREFIX.len()
            )));
        }
        Ok(())
    }
}
