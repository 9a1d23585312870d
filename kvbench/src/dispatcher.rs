//! Maps one [`Operation`] to exactly one timed backend call.

use std::future::Future;
use std::time::Instant;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::client::Client;
use crate::config::RunConfig;
use crate::dataset::{self, field_name, key_name, member_name, stream_id};
use crate::error::{ClientError, ClientResult};
use crate::scenario::{DataType, Operation};

/// Result of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Failure(ClientError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub latency_us: f64,
    pub outcome: Outcome,
}

impl RawSample {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }
}

/// Per-worker source of operation arguments.
///
/// Keys are drawn uniformly from the populated keyspace; collection
/// elements from `0..collection_size`.
pub struct KeyCursor {
    rng: ChaCha8Rng,
    dataset_size: u64,
    collection_size: usize,
    value: Vec<u8>,
}

impl KeyCursor {
    pub fn new(rng: ChaCha8Rng, cfg: &RunConfig) -> Self {
        Self {
            rng,
            dataset_size: cfg.dataset_size.max(1),
            collection_size: cfg.collection_size.max(1),
            value: dataset::fixed_value(cfg.value_size),
        }
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    fn key(&mut self, data_type: DataType) -> String {
        key_name(data_type, self.rng.gen_range(0..self.dataset_size))
    }

    fn element(&mut self) -> usize {
        self.rng.gen_range(0..self.collection_size)
    }

    fn field(&mut self) -> String {
        field_name(self.element())
    }

    fn member(&mut self) -> String {
        member_name(self.element())
    }

    fn last_index(&self) -> i64 {
        self.collection_size as i64 - 1
    }
}

async fn timed<T>(call: impl Future<Output = ClientResult<T>>) -> RawSample {
    let start = Instant::now();
    let result = call.await;
    let latency_us = start.elapsed().as_secs_f64() * 1e6;
    RawSample {
        latency_us,
        outcome: match result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(e),
        },
    }
}

/// Issue `operation` against `client`. Arguments are drawn from `cursor`
/// before the clock starts; never retries.
pub async fn dispatch(
    client: &dyn Client,
    operation: Operation,
    cursor: &mut KeyCursor,
) -> RawSample {
    use Operation::*;

    let last = cursor.last_index();
    match operation {
        // strings
        Get => {
            let key = cursor.key(DataType::String);
            timed(client.get(&key)).await
        }
        Set => {
            let key = cursor.key(DataType::String);
            timed(client.set(&key, &cursor.value)).await
        }
        Incr => {
            let key = cursor.key(DataType::Counter);
            timed(client.incr(&key)).await
        }
        Append => {
            let key = cursor.key(DataType::String);
            timed(client.append(&key, b"x")).await
        }
        Strlen => {
            let key = cursor.key(DataType::String);
            timed(client.strlen(&key)).await
        }
        Mget => {
            let keys: Vec<String> = (0..cursor.collection_size)
                .map(|_| cursor.key(DataType::String))
                .collect();
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            timed(client.mget(&refs)).await
        }
        Mset => {
            let keys: Vec<String> = (0..cursor.collection_size)
                .map(|_| cursor.key(DataType::String))
                .collect();
            let pairs: Vec<(&str, &[u8])> = keys
                .iter()
                .map(|k| (k.as_str(), cursor.value.as_slice()))
                .collect();
            timed(client.mset(&pairs)).await
        }

        // lists
        Lpush => {
            let key = cursor.key(DataType::List);
            timed(client.lpush(&key, &[cursor.value.as_slice()])).await
        }
        Rpush => {
            let key = cursor.key(DataType::List);
            timed(client.rpush(&key, &[cursor.value.as_slice()])).await
        }
        Lpop => {
            let key = cursor.key(DataType::List);
            timed(client.lpop(&key, None)).await
        }
        Rpop => {
            let key = cursor.key(DataType::List);
            timed(client.rpop(&key, None)).await
        }
        Llen => {
            let key = cursor.key(DataType::List);
            timed(client.llen(&key)).await
        }
        Lrange => {
            let key = cursor.key(DataType::List);
            timed(client.lrange(&key, 0, last)).await
        }
        Lindex => {
            let key = cursor.key(DataType::List);
            let index = cursor.element() as i64;
            timed(client.lindex(&key, index)).await
        }

        // hashes
        Hset => {
            let key = cursor.key(DataType::Hash);
            let field = cursor.field();
            timed(client.hset(&key, &field, &cursor.value)).await
        }
        Hget => {
            let key = cursor.key(DataType::Hash);
            let field = cursor.field();
            timed(client.hget(&key, &field)).await
        }
        Hgetall => {
            let key = cursor.key(DataType::Hash);
            timed(client.hgetall(&key)).await
        }
        Hmget => {
            let key = cursor.key(DataType::Hash);
            let fields: Vec<String> = (0..cursor.collection_size).map(field_name).collect();
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            timed(client.hmget(&key, &refs)).await
        }
        Hlen => {
            let key = cursor.key(DataType::Hash);
            timed(client.hlen(&key)).await
        }
        Hdel => {
            let key = cursor.key(DataType::Hash);
            let field = cursor.field();
            timed(client.hdel(&key, &[field.as_str()])).await
        }
        Hincrby => {
            let key = cursor.key(DataType::Hash);
            let field = format!("counter_{}", cursor.element());
            timed(client.hincrby(&key, &field, 1)).await
        }

        // sets
        Sadd => {
            let key = cursor.key(DataType::Set);
            let member = cursor.member();
            timed(client.sadd(&key, &[member.as_bytes()])).await
        }
        Srem => {
            let key = cursor.key(DataType::Set);
            let member = cursor.member();
            timed(client.srem(&key, &[member.as_bytes()])).await
        }
        Smembers => {
            let key = cursor.key(DataType::Set);
            timed(client.smembers(&key)).await
        }
        Sismember => {
            let key = cursor.key(DataType::Set);
            let member = cursor.member();
            timed(client.sismember(&key, member.as_bytes())).await
        }
        Scard => {
            let key = cursor.key(DataType::Set);
            timed(client.scard(&key)).await
        }
        Spop => {
            let key = cursor.key(DataType::Set);
            timed(client.spop(&key, None)).await
        }
        Srandmember => {
            let key = cursor.key(DataType::Set);
            timed(client.srandmember(&key, None)).await
        }

        // sorted sets
        Zadd => {
            let key = cursor.key(DataType::SortedSet);
            let j = cursor.element();
            let member = member_name(j);
            timed(client.zadd(&key, &[(j as f64, member.as_bytes())])).await
        }
        Zrem => {
            let key = cursor.key(DataType::SortedSet);
            let member = cursor.member();
            timed(client.zrem(&key, &[member.as_bytes()])).await
        }
        Zrange => {
            let key = cursor.key(DataType::SortedSet);
            timed(client.zrange(&key, 0, last)).await
        }
        Zrangebyscore => {
            let key = cursor.key(DataType::SortedSet);
            timed(client.zrangebyscore(&key, 0.0, (last / 2) as f64)).await
        }
        Zscore => {
            let key = cursor.key(DataType::SortedSet);
            let member = cursor.member();
            timed(client.zscore(&key, member.as_bytes())).await
        }
        Zrank => {
            let key = cursor.key(DataType::SortedSet);
            let member = cursor.member();
            timed(client.zrank(&key, member.as_bytes())).await
        }
        Zcard => {
            let key = cursor.key(DataType::SortedSet);
            timed(client.zcard(&key)).await
        }
        Zcount => {
            let key = cursor.key(DataType::SortedSet);
            timed(client.zcount(&key, 0.0, (last / 2) as f64)).await
        }

        // streams
        Xadd => {
            let key = cursor.key(DataType::Stream);
            timed(client.xadd(&key, "*", &[("data", cursor.value.as_slice())])).await
        }
        Xlen => {
            let key = cursor.key(DataType::Stream);
            timed(client.xlen(&key)).await
        }
        Xrange => {
            let key = cursor.key(DataType::Stream);
            timed(client.xrange(&key, "-", "+")).await
        }
        Xrevrange => {
            let key = cursor.key(DataType::Stream);
            timed(client.xrevrange(&key, "+", "-")).await
        }
        Xread => {
            let key = cursor.key(DataType::Stream);
            timed(client.xread(&[key.as_str()], &["0-0"])).await
        }
        Xdel => {
            let key = cursor.key(DataType::Stream);
            let id = stream_id(cursor.element());
            timed(client.xdel(&key, &[id.as_str()])).await
        }
        Xtrim => {
            let key = cursor.key(DataType::Stream);
            timed(client.xtrim(&key, cursor.collection_size as i64)).await
        }

        // keys
        Del => {
            let key = cursor.key(DataType::String);
            timed(client.del(&[key.as_str()])).await
        }
        Exists => {
            let key = cursor.key(DataType::String);
            timed(client.exists(&[key.as_str()])).await
        }
        Type => {
            let key = cursor.key(DataType::String);
            timed(client.key_type(&key)).await
        }
        Expire => {
            let key = cursor.key(DataType::String);
            timed(client.expire(&key, 10)).await
        }
        Ttl => {
            let key = cursor.key(DataType::String);
            timed(client.ttl(&key)).await
        }
    }
}
