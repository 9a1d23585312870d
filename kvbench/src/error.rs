//! Error taxonomy for kvbench.
//!
//! Errors are split by the phase that detects them:
//! - [`ConfigError`]: scenario or run settings are unusable, nothing runs.
//! - [`ClientError`]: a single backend call failed. Counted, never fatal.
//! - [`ScenarioRunError`]: one scenario/backend pairing had to stop.
//! - [`BenchError`]: anything that stops the whole invocation.

use std::time::Duration;

use crate::scenario::Operation;

pub type BenchResult<T> = std::result::Result<T, BenchError>;
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failure reported by a backend for a single call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("WRONGTYPE operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotInteger,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("operation error: {0}")]
    Operation(String),
}

/// An operation identifier could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
}

/// Scenario or run configuration is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("scenario `{scenario}`: weights sum to {sum:.2}, expected 100 ± 1")]
    InvalidWeights { scenario: String, sum: f64 },
    #[error("scenario `{scenario}` has no operations")]
    EmptyScenario { scenario: String },
    #[error("scenario `{scenario}`: weight {weight} for {operation} must be finite and positive")]
    NonPositiveWeight {
        scenario: String,
        operation: Operation,
        weight: f64,
    },
    #[error("scenario `{scenario}`: {source}")]
    UnknownOperation {
        scenario: String,
        #[source]
        source: DispatchError,
    },
    #[error("scenario `{0}` is defined more than once")]
    DuplicateScenario(String),
    #[error("scenario `{0}` not found")]
    UnknownScenario(String),
    #[error("no scenarios selected")]
    NoScenarios,
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    #[error("failed to read scenario file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Fatal failure of one scenario/backend pairing.
///
/// The rest of the run carries on; the pairing is reported as absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioRunError {
    #[error("backend unreachable: {0}")]
    Connection(ClientError),
    #[error("dataset population failed: {0}")]
    Setup(ClientError),
    #[error("{operation} exceeded the {timeout:?} operation timeout")]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },
    #[error("run aborted")]
    Aborted,
    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

/// Errors that stop the whole invocation.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
    #[error("backend setup error: {0}")]
    Backend(#[from] ClientError),
    #[error("runtime error: {0}")]
    Runtime(String),
}
