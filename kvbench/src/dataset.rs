//! Deterministic synthetic keyspace built before every measurement.
//!
//! Key layout, per data type and `i in 0..dataset_size`:
//!
//! | type        | key           | contents                                      |
//! |-------------|---------------|-----------------------------------------------|
//! | string      | `key_<i>`     | fixed-size value                              |
//! | counter     | `counter_<i>` | `"0"`                                         |
//! | hash        | `hash_<i>`    | `field_<j>` → value                           |
//! | list        | `list_<i>`    | `collection_size` values                      |
//! | set         | `set_<i>`     | `member_<j>`                                  |
//! | sorted set  | `zset_<i>`    | `member_<j>` scored `j`                       |
//! | stream      | `stream_<i>`  | entries `<j+1>-0` with one `data` field       |

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::client::{Client, Durability};
use crate::config::RunConfig;
use crate::error::ClientResult;
use crate::scenario::{DataType, WorkloadScenario};

pub const VALUE_PREFIX: &[u8] = b"value_";

/// `value_` padded with `x` to `size` bytes.
pub fn fixed_value(size: usize) -> Vec<u8> {
    let mut value = VALUE_PREFIX.to_vec();
    value.resize(size.max(VALUE_PREFIX.len()), b'x');
    value
}

pub fn key_name(data_type: DataType, index: u64) -> String {
    format!("{}_{}", data_type.key_prefix(), index)
}

pub fn field_name(index: usize) -> String {
    format!("field_{index}")
}

pub fn member_name(index: usize) -> String {
    format!("member_{index}")
}

pub fn stream_id(index: usize) -> String {
    format!("{}-0", index + 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulationStats {
    pub keys_per_type: BTreeMap<DataType, u64>,
    /// Collection elements written across all keys.
    pub elements: u64,
    #[serde(skip)]
    pub duration: Duration,
}

impl PopulationStats {
    pub fn total_keys(&self) -> u64 {
        self.keys_per_type.values().sum()
    }
}

/// Flush the backend and write every keyspace `scenario` touches.
///
/// File-backed backends get a final [`Client::commit`] so measurement
/// starts from persisted data.
pub async fn populate(
    client: &dyn Client,
    scenario: &WorkloadScenario,
    cfg: &RunConfig,
) -> ClientResult<PopulationStats> {
    let start = Instant::now();
    let value = fixed_value(cfg.value_size);
    let mut stats = PopulationStats::default();

    client.flushdb().await?;

    for data_type in scenario.required_data_types() {
        let mut elements = 0u64;
        for i in 0..cfg.dataset_size {
            let key = key_name(data_type, i);
            elements += populate_key(client, data_type, &key, &value, cfg.collection_size).await?;
        }
        debug!(
            backend = client.name(),
            %data_type,
            keys = cfg.dataset_size,
            elements,
            "populated keyspace"
        );
        stats.keys_per_type.insert(data_type, cfg.dataset_size);
        stats.elements += elements;
    }

    if client.durability() == Durability::FileBacked {
        client.commit().await?;
    }

    stats.duration = start.elapsed();
    info!(
        backend = client.name(),
        scenario = %scenario.name,
        keys = stats.total_keys(),
        elements = stats.elements,
        elapsed_ms = stats.duration.as_millis() as u64,
        "dataset ready"
    );
    Ok(stats)
}

/// Returns the number of collection elements written.
async fn populate_key(
    client: &dyn Client,
    data_type: DataType,
    key: &str,
    value: &[u8],
    collection_size: usize,
) -> ClientResult<u64> {
    match data_type {
        DataType::String => {
            client.set(key, value).await?;
            Ok(0)
        }
        DataType::Counter => {
            client.set(key, b"0").await?;
            Ok(0)
        }
        DataType::Hash => {
            for j in 0..collection_size {
                client.hset(key, &field_name(j), value).await?;
            }
            Ok(collection_size as u64)
        }
        DataType::List => {
            let values = vec![value; collection_size];
            client.rpush(key, &values).await?;
            Ok(collection_size as u64)
        }
        DataType::Set => {
            let members: Vec<String> = (0..collection_size).map(member_name).collect();
            let refs: Vec<&[u8]> = members.iter().map(|m| m.as_bytes()).collect();
            client.sadd(key, &refs).await?;
            Ok(collection_size as u64)
        }
        DataType::SortedSet => {
            let members: Vec<String> = (0..collection_size).map(member_name).collect();
            let scored: Vec<(f64, &[u8])> = members
                .iter()
                .enumerate()
                .map(|(j, m)| (j as f64, m.as_bytes()))
                .collect();
            client.zadd(key, &scored).await?;
            Ok(collection_size as u64)
        }
        DataType::Stream => {
            for j in 0..collection_size {
                client.xadd(key, &stream_id(j), &[("data", value)]).await?;
            }
            Ok(collection_size as u64)
        }
    }
}
