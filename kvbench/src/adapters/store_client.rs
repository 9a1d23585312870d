//! [`Client`] implementation over a mutex-guarded [`Keyspace`].

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::keyspace::{EntryStore, Keyspace};
use crate::client::{Client, Durability, StreamEntry};
use crate::error::ClientResult;

/// Shares one keyspace between all workers of a run.
///
/// An optional round-trip delay is awaited before every call, which makes
/// an in-process store behave like a networked one from the executor's
/// point of view: calls yield to the scheduler and can exceed the
/// per-operation timeout.
pub struct StoreClient<S> {
    name: String,
    version: String,
    durability: Durability,
    round_trip: Option<Duration>,
    keyspace: Mutex<Keyspace<S>>,
}

impl<S: EntryStore> StoreClient<S> {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        durability: Durability,
        store: S,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            durability,
            round_trip: None,
            keyspace: Mutex::new(Keyspace::new(store)),
        }
    }

    /// Simulated network round trip per call. Zero disables it.
    pub fn with_round_trip(mut self, rtt: Duration) -> Self {
        self.round_trip = (!rtt.is_zero()).then_some(rtt);
        self
    }

    async fn call<R>(
        &self,
        f: impl FnOnce(&mut Keyspace<S>) -> ClientResult<R>,
    ) -> ClientResult<R> {
        if let Some(rtt) = self.round_trip {
            tokio::time::sleep(rtt).await;
        }
        let mut keyspace = self.keyspace.lock();
        f(&mut keyspace)
    }
}

#[async_trait]
impl<S: EntryStore + 'static> Client for StoreClient<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn durability(&self) -> Durability {
        self.durability
    }

    async fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        self.call(|ks| ks.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> ClientResult<()> {
        self.call(|ks| ks.set(key, value)).await
    }

    async fn incr(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.incr(key)).await
    }

    async fn append(&self, key: &str, value: &[u8]) -> ClientResult<usize> {
        self.call(|ks| ks.append(key, value)).await
    }

    async fn strlen(&self, key: &str) -> ClientResult<usize> {
        self.call(|ks| ks.strlen(key)).await
    }

    async fn mget(&self, keys: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        self.call(|ks| ks.mget(keys)).await
    }

    async fn mset(&self, pairs: &[(&str, &[u8])]) -> ClientResult<()> {
        self.call(|ks| ks.mset(pairs)).await
    }

    async fn lpush(&self, key: &str, values: &[&[u8]]) -> ClientResult<i64> {
        self.call(|ks| ks.lpush(key, values)).await
    }

    async fn rpush(&self, key: &str, values: &[&[u8]]) -> ClientResult<i64> {
        self.call(|ks| ks.rpush(key, values)).await
    }

    async fn lpop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.lpop(key, count)).await
    }

    async fn rpop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.rpop(key, count)).await
    }

    async fn llen(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.llen(key)).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.lrange(key, start, stop)).await
    }

    async fn lindex(&self, key: &str, index: i64) -> ClientResult<Option<Vec<u8>>> {
        self.call(|ks| ks.lindex(key, index)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> ClientResult<i64> {
        self.call(|ks| ks.hset(key, field, value)).await
    }

    async fn hget(&self, key: &str, field: &str) -> ClientResult<Option<Vec<u8>>> {
        self.call(|ks| ks.hget(key, field)).await
    }

    async fn hgetall(&self, key: &str) -> ClientResult<Vec<(String, Vec<u8>)>> {
        self.call(|ks| ks.hgetall(key)).await
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        self.call(|ks| ks.hmget(key, fields)).await
    }

    async fn hlen(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.hlen(key)).await
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> ClientResult<i64> {
        self.call(|ks| ks.hdel(key, fields)).await
    }

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> ClientResult<i64> {
        self.call(|ks| ks.hincrby(key, field, increment)).await
    }

    async fn sadd(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.call(|ks| ks.sadd(key, members)).await
    }

    async fn srem(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.call(|ks| ks.srem(key, members)).await
    }

    async fn smembers(&self, key: &str) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.smembers(key)).await
    }

    async fn sismember(&self, key: &str, member: &[u8]) -> ClientResult<bool> {
        self.call(|ks| ks.sismember(key, member)).await
    }

    async fn scard(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.scard(key)).await
    }

    async fn spop(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.spop(key, count)).await
    }

    async fn srandmember(&self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.srandmember(key, count)).await
    }

    async fn zadd(&self, key: &str, members: &[(f64, &[u8])]) -> ClientResult<i64> {
        self.call(|ks| ks.zadd(key, members)).await
    }

    async fn zrem(&self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.call(|ks| ks.zrem(key, members)).await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.zrange(key, start, stop)).await
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> ClientResult<Vec<Vec<u8>>> {
        self.call(|ks| ks.zrangebyscore(key, min, max)).await
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> ClientResult<Option<f64>> {
        self.call(|ks| ks.zscore(key, member)).await
    }

    async fn zrank(&self, key: &str, member: &[u8]) -> ClientResult<Option<i64>> {
        self.call(|ks| ks.zrank(key, member)).await
    }

    async fn zcard(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.zcard(key)).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> ClientResult<i64> {
        self.call(|ks| ks.zcount(key, min, max)).await
    }

    async fn xadd(&self, key: &str, id: &str, fields: &[(&str, &[u8])]) -> ClientResult<String> {
        self.call(|ks| ks.xadd(key, id, fields)).await
    }

    async fn xlen(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.xlen(key)).await
    }

    async fn xrange(&self, key: &str, start: &str, end: &str) -> ClientResult<Vec<StreamEntry>> {
        self.call(|ks| ks.xrange(key, start, end)).await
    }

    async fn xrevrange(
        &self,
        key: &str,
        end: &str,
        start: &str,
    ) -> ClientResult<Vec<StreamEntry>> {
        self.call(|ks| ks.xrevrange(key, end, start)).await
    }

    async fn xread(&self, keys: &[&str], ids: &[&str]) -> ClientResult<Vec<StreamEntry>> {
        self.call(|ks| ks.xread(keys, ids)).await
    }

    async fn xdel(&self, key: &str, ids: &[&str]) -> ClientResult<i64> {
        self.call(|ks| ks.xdel(key, ids)).await
    }

    async fn xtrim(&self, key: &str, maxlen: i64) -> ClientResult<i64> {
        self.call(|ks| ks.xtrim(key, maxlen)).await
    }

    async fn del(&self, keys: &[&str]) -> ClientResult<i64> {
        self.call(|ks| ks.del(keys)).await
    }

    async fn exists(&self, keys: &[&str]) -> ClientResult<i64> {
        self.call(|ks| ks.exists(keys)).await
    }

    async fn key_type(&self, key: &str) -> ClientResult<String> {
        self.call(|ks| ks.key_type(key)).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> ClientResult<bool> {
        self.call(|ks| ks.expire(key, seconds)).await
    }

    async fn ttl(&self, key: &str) -> ClientResult<i64> {
        self.call(|ks| ks.ttl(key)).await
    }

    async fn flushdb(&self) -> ClientResult<()> {
        self.call(|ks| ks.flushdb()).await
    }

    async fn ping(&self) -> ClientResult<()> {
        self.call(|ks| ks.ping()).await
    }

    async fn commit(&self) -> ClientResult<()> {
        self.call(|ks| ks.commit()).await
    }
}
