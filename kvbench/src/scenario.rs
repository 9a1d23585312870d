//! Workload scenarios: named, weighted mixtures of backend operations.
//!
//! Scenario files are YAML:
//!
//! ```yaml
//! workloads:
//!   - name: cache_pattern
//!     description: Read-heavy cache access
//!     operations:
//!       - { type: GET, weight: 70 }
//!       - { type: SET, weight: 20 }
//!       - { type: INCR, weight: 5 }
//!       - { type: DEL, weight: 5 }
//! ```
//!
//! Operation identifiers are resolved against the closed [`Operation`] enum
//! while loading, so nothing downstream ever sees an unknown operation.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DispatchError};

/// Allowed distance of the weight sum from 100.
pub const WEIGHT_TOLERANCE: f64 = 1.0;

// ────────────────────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────────────────────

/// Every operation kind the dispatcher can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    // strings
    Get,
    Set,
    Incr,
    Append,
    Strlen,
    Mget,
    Mset,
    // lists
    Lpush,
    Rpush,
    Lpop,
    Rpop,
    Llen,
    Lrange,
    Lindex,
    // hashes
    Hset,
    Hget,
    Hgetall,
    Hmget,
    Hlen,
    Hdel,
    Hincrby,
    // sets
    Sadd,
    Srem,
    Smembers,
    Sismember,
    Scard,
    Spop,
    Srandmember,
    // sorted sets
    Zadd,
    Zrem,
    Zrange,
    Zrangebyscore,
    Zscore,
    Zrank,
    Zcard,
    Zcount,
    // streams
    Xadd,
    Xlen,
    Xrange,
    Xrevrange,
    Xread,
    Xdel,
    Xtrim,
    // keys
    Del,
    Exists,
    Type,
    Expire,
    Ttl,
}

impl Operation {
    pub const ALL: [Operation; 48] = [
        Operation::Get,
        Operation::Set,
        Operation::Incr,
        Operation::Append,
        Operation::Strlen,
        Operation::Mget,
        Operation::Mset,
        Operation::Lpush,
        Operation::Rpush,
        Operation::Lpop,
        Operation::Rpop,
        Operation::Llen,
        Operation::Lrange,
        Operation::Lindex,
        Operation::Hset,
        Operation::Hget,
        Operation::Hgetall,
        Operation::Hmget,
        Operation::Hlen,
        Operation::Hdel,
        Operation::Hincrby,
        Operation::Sadd,
        Operation::Srem,
        Operation::Smembers,
        Operation::Sismember,
        Operation::Scard,
        Operation::Spop,
        Operation::Srandmember,
        Operation::Zadd,
        Operation::Zrem,
        Operation::Zrange,
        Operation::Zrangebyscore,
        Operation::Zscore,
        Operation::Zrank,
        Operation::Zcard,
        Operation::Zcount,
        Operation::Xadd,
        Operation::Xlen,
        Operation::Xrange,
        Operation::Xrevrange,
        Operation::Xread,
        Operation::Xdel,
        Operation::Xtrim,
        Operation::Del,
        Operation::Exists,
        Operation::Type,
        Operation::Expire,
        Operation::Ttl,
    ];

    /// Canonical command name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Set => "SET",
            Operation::Incr => "INCR",
            Operation::Append => "APPEND",
            Operation::Strlen => "STRLEN",
            Operation::Mget => "MGET",
            Operation::Mset => "MSET",
            Operation::Lpush => "LPUSH",
            Operation::Rpush => "RPUSH",
            Operation::Lpop => "LPOP",
            Operation::Rpop => "RPOP",
            Operation::Llen => "LLEN",
            Operation::Lrange => "LRANGE",
            Operation::Lindex => "LINDEX",
            Operation::Hset => "HSET",
            Operation::Hget => "HGET",
            Operation::Hgetall => "HGETALL",
            Operation::Hmget => "HMGET",
            Operation::Hlen => "HLEN",
            Operation::Hdel => "HDEL",
            Operation::Hincrby => "HINCRBY",
            Operation::Sadd => "SADD",
            Operation::Srem => "SREM",
            Operation::Smembers => "SMEMBERS",
            Operation::Sismember => "SISMEMBER",
            Operation::Scard => "SCARD",
            Operation::Spop => "SPOP",
            Operation::Srandmember => "SRANDMEMBER",
            Operation::Zadd => "ZADD",
            Operation::Zrem => "ZREM",
            Operation::Zrange => "ZRANGE",
            Operation::Zrangebyscore => "ZRANGEBYSCORE",
            Operation::Zscore => "ZSCORE",
            Operation::Zrank => "ZRANK",
            Operation::Zcard => "ZCARD",
            Operation::Zcount => "ZCOUNT",
            Operation::Xadd => "XADD",
            Operation::Xlen => "XLEN",
            Operation::Xrange => "XRANGE",
            Operation::Xrevrange => "XREVRANGE",
            Operation::Xread => "XREAD",
            Operation::Xdel => "XDEL",
            Operation::Xtrim => "XTRIM",
            Operation::Del => "DEL",
            Operation::Exists => "EXISTS",
            Operation::Type => "TYPE",
            Operation::Expire => "EXPIRE",
            Operation::Ttl => "TTL",
        }
    }

    /// The keyspace this operation reads or writes.
    pub fn data_type(&self) -> DataType {
        use Operation::*;
        match self {
            Incr => DataType::Counter,
            Get | Set | Append | Strlen | Mget | Mset | Del | Exists | Type | Expire | Ttl => {
                DataType::String
            }
            Lpush | Rpush | Lpop | Rpop | Llen | Lrange | Lindex => DataType::List,
            Hset | Hget | Hgetall | Hmget | Hlen | Hdel | Hincrby => DataType::Hash,
            Sadd | Srem | Smembers | Sismember | Scard | Spop | Srandmember => DataType::Set,
            Zadd | Zrem | Zrange | Zrangebyscore | Zscore | Zrank | Zcard | Zcount => {
                DataType::SortedSet
            }
            Xadd | Xlen | Xrange | Xrevrange | Xread | Xdel | Xtrim => DataType::Stream,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| DispatchError::UnknownOperation(trimmed.to_string()))
    }
}

/// Synthetic keyspaces the populator knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Counter,
    Hash,
    List,
    Set,
    SortedSet,
    Stream,
}

impl DataType {
    /// Key prefix; keys are named `<prefix>_<i>`.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            DataType::String => "key",
            DataType::Counter => "counter",
            DataType::Hash => "hash",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::SortedSet => "zset",
            DataType::Stream => "stream",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "strings",
            DataType::Counter => "counters",
            DataType::Hash => "hashes",
            DataType::List => "lists",
            DataType::Set => "sets",
            DataType::SortedSet => "sorted sets",
            DataType::Stream => "streams",
        };
        f.write_str(name)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Scenarios
// ────────────────────────────────────────────────────────────────────────────────

/// An operation and its relative frequency within a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationWeight {
    pub operation: Operation,
    pub weight: f64,
}

impl OperationWeight {
    pub fn new(operation: Operation, weight: f64) -> Self {
        Self { operation, weight }
    }
}

/// A validated, immutable workload definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadScenario {
    pub name: String,
    pub description: Option<String>,
    pub operations: Vec<OperationWeight>,
}

impl WorkloadScenario {
    /// Build and validate a scenario from already-resolved operations.
    pub fn new(
        name: impl Into<String>,
        operations: Vec<OperationWeight>,
    ) -> Result<Self, ConfigError> {
        let scenario = Self {
            name: name.into(),
            description: None,
            operations,
        };
        validate(&scenario)?;
        Ok(scenario)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sum of all operation weights.
    pub fn total_weight(&self) -> f64 {
        self.operations.iter().map(|op| op.weight).sum()
    }

    /// Distinct keyspaces touched by this scenario, in a stable order.
    pub fn required_data_types(&self) -> Vec<DataType> {
        let mut types: Vec<DataType> = self
            .operations
            .iter()
            .map(|op| op.operation.data_type())
            .collect();
        types.sort();
        types.dedup();
        types
    }
}

/// Check the weight invariant and that the scenario is not empty.
pub fn validate(scenario: &WorkloadScenario) -> Result<(), ConfigError> {
    if scenario.operations.is_empty() {
        return Err(ConfigError::EmptyScenario {
            scenario: scenario.name.clone(),
        });
    }

    for op in &scenario.operations {
        if !op.weight.is_finite() || op.weight <= 0.0 {
            return Err(ConfigError::NonPositiveWeight {
                scenario: scenario.name.clone(),
                operation: op.operation,
                weight: op.weight,
            });
        }
    }

    let sum = scenario.total_weight();
    if (sum - 100.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::InvalidWeights {
            scenario: scenario.name.clone(),
            sum,
        });
    }

    Ok(())
}

/// Precompute the cumulative table used to pick operations.
///
/// The scenario is validated first, so a sampler always holds at least one
/// operation.
pub fn build_sampler(scenario: &WorkloadScenario) -> Result<WeightedSampler, ConfigError> {
    validate(scenario)?;
    Ok(WeightedSampler::new(&scenario.operations))
}

/// O(log k) weighted operation picker.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    operations: Vec<Operation>,
    /// Normalized cumulative weights; the last entry is 1.0.
    cumulative: Vec<f64>,
}

impl WeightedSampler {
    fn new(weights: &[OperationWeight]) -> Self {
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        let mut operations = Vec::with_capacity(weights.len());
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut running = 0.0;

        for w in weights {
            running += w.weight / total;
            operations.push(w.operation);
            cumulative.push(running);
        }
        if let Some(last) = cumulative.last_mut() {
            *last = 1.0;
        }

        Self {
            operations,
            cumulative,
        }
    }

    /// Map a uniform value in `[0, 1)` onto an operation.
    pub fn select(&self, u: f64) -> Operation {
        let idx = self
            .cumulative
            .partition_point(|&c| c <= u)
            .min(self.operations.len() - 1);
        self.operations[idx]
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Operation {
        self.select(rng.gen::<f64>())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Loading
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    workloads: Vec<RawScenario>,
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    operations: Vec<RawOperationWeight>,
}

#[derive(Debug, Deserialize)]
struct RawOperationWeight {
    #[serde(rename = "type")]
    operation: String,
    weight: f64,
}

impl RawScenario {
    fn resolve(self) -> Result<WorkloadScenario, ConfigError> {
        let mut operations = Vec::with_capacity(self.operations.len());
        for raw in self.operations {
            let operation = raw
                .operation
                .parse::<Operation>()
                .map_err(|source| ConfigError::UnknownOperation {
                    scenario: self.name.clone(),
                    source,
                })?;
            operations.push(OperationWeight::new(operation, raw.weight));
        }

        let scenario = WorkloadScenario {
            name: self.name,
            description: self.description,
            operations,
        };
        validate(&scenario)?;
        Ok(scenario)
    }
}

/// Parse and validate every scenario in a YAML document.
pub fn parse_scenarios(yaml: &str, origin: &str) -> Result<Vec<WorkloadScenario>, ConfigError> {
    let file: ScenarioFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;

    let mut seen = HashSet::new();
    let mut scenarios = Vec::with_capacity(file.workloads.len());
    for raw in file.workloads {
        if !seen.insert(raw.name.clone()) {
            return Err(ConfigError::DuplicateScenario(raw.name));
        }
        scenarios.push(raw.resolve()?);
    }
    Ok(scenarios)
}

/// Load and validate every scenario in a YAML file.
pub fn load_scenarios(path: &Path) -> Result<Vec<WorkloadScenario>, ConfigError> {
    let origin = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: origin.clone(),
        source,
    })?;
    parse_scenarios(&content, &origin)
}

/// Keep the scenarios named in a comma-separated filter, in file order.
///
/// `None` or an empty filter selects everything.
pub fn select_scenarios(
    scenarios: Vec<WorkloadScenario>,
    filter: Option<&str>,
) -> Result<Vec<WorkloadScenario>, ConfigError> {
    let names: Vec<&str> = filter
        .map(|f| f.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();

    let selected: Vec<WorkloadScenario> = if names.is_empty() {
        scenarios
    } else {
        if let Some(missing) = names
            .iter()
            .find(|name| !scenarios.iter().any(|s| s.name == **name))
        {
            return Err(ConfigError::UnknownScenario((*missing).to_string()));
        }
        scenarios
            .into_iter()
            .filter(|s| names.contains(&s.name.as_str()))
            .collect()
    };

    if selected.is_empty() {
        return Err(ConfigError::NoScenarios);
    }
    Ok(selected)
}
