//! The capability contract every benchmarked backend implements.
//!
//! A backend is anything that can answer the 48 data operations below plus
//! the utility calls used by the populator (`flushdb`, `commit`) and the
//! runner (`ping`). The handle is shared by all workers of a run, so
//! implementations must accept concurrent calls through `&self`.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ClientResult;

/// Single entry returned by XRANGE / XREVRANGE / XREAD.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, Vec<u8>)>,
}

/// Persistence class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Nothing to flush; data lives in memory only.
    Volatile,
    /// File-backed; population must end with [`Client::commit`].
    FileBacked,
}

#[async_trait]
pub trait Client: Send + Sync {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// Version string recorded in report metadata.
    fn version(&self) -> String {
        "unknown".to_string()
    }

    fn durability(&self) -> Durability {
        Durability::Volatile
    }

    // ── strings ──
    async fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> ClientResult<()>;
    async fn incr(&self, key: &str) -> ClientResult<i64>;
    async fn append(&self, key: &str, value: &[u8]) -> ClientResult<usize>;
    async fn strlen(&self, key: &str) -> ClientResult<usize>;
    async fn mget(&self, keys: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>>;
    async fn mset(&self, pairs: &[(&str, &[u8])]) -> ClientResult<()>;

    // ── lists ──
    async fn lpush(&self, key: &str, values: &[&[u8]]) -> ClientResult<i64>;
    async fn rpush(&self, key: &str, values: &[&[u8]]) -> ClientResult<i64>;
    async fn lpop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>>;
    async fn rpop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>>;
    async fn llen(&self, key: &str) -> ClientResult<i64>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>>;
    async fn lindex(&self, key: &str, index: i64) -> ClientResult<Option<Vec<u8>>>;

    // ── hashes ──
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> ClientResult<i64>;
    async fn hget(&self, key: &str, field: &str) -> ClientResult<Option<Vec<u8>>>;
    async fn hgetall(&self, key: &str) -> ClientResult<Vec<(String, Vec<u8>)>>;
    async fn hmget(&self, key: &str, fields: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>>;
    async fn hlen(&self, key: &str) -> ClientResult<i64>;
    async fn hdel(&self, key: &str, fields: &[&str]) -> ClientResult<i64>;
    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> ClientResult<i64>;

    // ── sets ──
    async fn sadd(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64>;
    async fn srem(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64>;
    async fn smembers(&self, key: &str) -> ClientResult<Vec<Vec<u8>>>;
    async fn sismember(&self, key: &str, member: &[u8]) -> ClientResult<bool>;
    async fn scard(&self, key: &str) -> ClientResult<i64>;
    async fn spop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>>;
    async fn srandmember(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>>;

    // ── sorted sets ──
    async fn zadd(&self, key: &str, members: &[(f64, &[u8])]) -> ClientResult<i64>;
    async fn zrem(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64>;
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>>;
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> ClientResult<Vec<Vec<u8>>>;
    async fn zscore(&self, key: &str, member: &[u8]) -> ClientResult<Option<f64>>;
    async fn zrank(&self, key: &str, member: &[u8]) -> ClientResult<Option<i64>>;
    async fn zcard(&self, key: &str) -> ClientResult<i64>;
    async fn zcount(&self, key: &str, min: f64, max: f64) -> ClientResult<i64>;

    // ── streams ──
    /// `id` is either `*` (auto-generate) or an explicit `<ms>-<seq>`.
    async fn xadd(&self, key: &str, id: &str, fields: &[(&str, &[u8])]) -> ClientResult<String>;
    async fn xlen(&self, key: &str) -> ClientResult<i64>;
    async fn xrange(&self, key: &str, start: &str, end: &str) -> ClientResult<Vec<StreamEntry>>;
    async fn xrevrange(&self, key: &str, end: &str, start: &str)
        -> ClientResult<Vec<StreamEntry>>;
    async fn xread(&self, keys: &[&str], ids: &[&str]) -> ClientResult<Vec<StreamEntry>>;
    async fn xdel(&self, key: &str, ids: &[&str]) -> ClientResult<i64>;
    async fn xtrim(&self, key: &str, maxlen: i64) -> ClientResult<i64>;

    // ── keys ──
    async fn del(&self, keys: &[&str]) -> ClientResult<i64>;
    async fn exists(&self, keys: &[&str]) -> ClientResult<i64>;
    async fn key_type(&self, key: &str) -> ClientResult<String>;
    async fn expire(&self, key: &str, seconds: u64) -> ClientResult<bool>;
    /// Redis conventions: -2 missing key, -1 no expiry.
    async fn ttl(&self, key: &str) -> ClientResult<i64>;

    // ── utility ──
    async fn flushdb(&self) -> ClientResult<()>;
    async fn ping(&self) -> ClientResult<()>;

    /// Durability barrier: block until previously written data is persisted.
    async fn commit(&self) -> ClientResult<()> {
        Ok(())
    }
}
