//! Command semantics shared by the reference adapters.
//!
//! A [`Keyspace`] implements Redis-style data-type behaviour on top of any
//! [`EntryStore`], which only knows how to load, store and remove whole
//! entries. The memory adapter keeps entries in a `HashMap`; the SQLite
//! adapter serializes them into a single table.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use crate::client::StreamEntry;
use crate::error::{ClientError, ClientResult};

// ────────────────────────────────────────────────────────────────────────────────
// Stored values
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZMember {
    pub member: Vec<u8>,
    pub score: f64,
}

/// Stream ID `<ms>-<seq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct StreamId(pub u64, pub u64);

impl StreamId {
    pub const MIN: StreamId = StreamId(0, 0);
    pub const MAX: StreamId = StreamId(u64::MAX, u64::MAX);

    fn parse(s: &str, default_seq: u64) -> ClientResult<Self> {
        let invalid = || ClientError::InvalidArgument(format!("invalid stream ID `{s}`"));
        match s.split_once('-') {
            Some((ms, seq)) => Ok(StreamId(
                ms.parse().map_err(|_| invalid())?,
                seq.parse().map_err(|_| invalid())?,
            )),
            None => Ok(StreamId(s.parse().map_err(|_| invalid())?, default_seq)),
        }
    }

    fn parse_start(s: &str) -> ClientResult<Self> {
        if s == "-" {
            Ok(Self::MIN)
        } else {
            Self::parse(s, 0)
        }
    }

    fn parse_end(s: &str) -> ClientResult<Self> {
        if s == "+" {
            Ok(Self::MAX)
        } else {
            Self::parse(s, u64::MAX)
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: StreamId,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl StreamRecord {
    fn to_entry(&self) -> StreamEntry {
        StreamEntry {
            id: self.id.to_string(),
            fields: self.fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamLog {
    pub last_id: StreamId,
    pub records: Vec<StreamRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Value {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(BTreeMap<String, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    /// Ordered by (score, member).
    SortedSet(Vec<ZMember>),
    Stream(StreamLog),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    /// Collections disappear once their last element is removed. Streams don't.
    fn is_drained(&self) -> bool {
        match self {
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
            Value::String(_) | Value::Stream(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at_ms: None,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ────────────────────────────────────────────────────────────────────────────────
// Storage seam
// ────────────────────────────────────────────────────────────────────────────────

/// Whole-entry storage underneath a [`Keyspace`].
pub trait EntryStore: Send {
    fn load(&mut self, key: &str) -> ClientResult<Option<Entry>>;
    fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()>;
    /// Returns whether the key existed.
    fn remove(&mut self, key: &str) -> ClientResult<bool>;
    fn clear(&mut self) -> ClientResult<()>;

    /// Persist everything written so far.
    fn sync(&mut self) -> ClientResult<()> {
        Ok(())
    }

    fn ping(&mut self) -> ClientResult<()> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Typed slot accessors
// ────────────────────────────────────────────────────────────────────────────────

fn wrong_type<T>() -> ClientResult<T> {
    Err(ClientError::WrongType)
}

fn list_of(value: Option<&Value>) -> ClientResult<Option<&VecDeque<Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => wrong_type(),
    }
}

fn hash_of(value: Option<&Value>) -> ClientResult<Option<&BTreeMap<String, Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => wrong_type(),
    }
}

fn set_of(value: Option<&Value>) -> ClientResult<Option<&BTreeSet<Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => wrong_type(),
    }
}

fn zset_of(value: Option<&Value>) -> ClientResult<Option<&Vec<ZMember>>> {
    match value {
        None => Ok(None),
        Some(Value::SortedSet(z)) => Ok(Some(z)),
        Some(_) => wrong_type(),
    }
}

fn stream_of(value: Option<&Value>) -> ClientResult<Option<&StreamLog>> {
    match value {
        None => Ok(None),
        Some(Value::Stream(s)) => Ok(Some(s)),
        Some(_) => wrong_type(),
    }
}

/// Borrow the slot's value mutably, creating it with `init` when absent.
fn slot_value<'a>(slot: &'a mut Option<Entry>, init: impl FnOnce() -> Value) -> &'a mut Value {
    &mut slot.get_or_insert_with(|| Entry::new(init())).value
}

fn list_mut(slot: &mut Option<Entry>) -> ClientResult<&mut VecDeque<Vec<u8>>> {
    match slot_value(slot, || Value::List(VecDeque::new())) {
        Value::List(l) => Ok(l),
        _ => wrong_type(),
    }
}

fn hash_mut(slot: &mut Option<Entry>) -> ClientResult<&mut BTreeMap<String, Vec<u8>>> {
    match slot_value(slot, || Value::Hash(BTreeMap::new())) {
        Value::Hash(h) => Ok(h),
        _ => wrong_type(),
    }
}

fn set_mut(slot: &mut Option<Entry>) -> ClientResult<&mut BTreeSet<Vec<u8>>> {
    match slot_value(slot, || Value::Set(BTreeSet::new())) {
        Value::Set(s) => Ok(s),
        _ => wrong_type(),
    }
}

fn zset_mut(slot: &mut Option<Entry>) -> ClientResult<&mut Vec<ZMember>> {
    match slot_value(slot, || Value::SortedSet(Vec::new())) {
        Value::SortedSet(z) => Ok(z),
        _ => wrong_type(),
    }
}

fn stream_mut(slot: &mut Option<Entry>) -> ClientResult<&mut StreamLog> {
    match slot_value(slot, || Value::Stream(StreamLog::default())) {
        Value::Stream(s) => Ok(s),
        _ => wrong_type(),
    }
}

/// Resolve Redis-style inclusive `start..=stop` indices (negatives count
/// from the end) against a collection of `len` elements.
fn index_range(len: usize, start: i64, stop: i64) -> Option<std::ops::RangeInclusive<usize>> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some(start as usize..=stop as usize)
}

fn parse_int(bytes: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ClientError::NotInteger)
}

fn sort_zset(members: &mut [ZMember]) {
    members.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.member.cmp(&b.member))
    });
}

// ────────────────────────────────────────────────────────────────────────────────
// Keyspace
// ────────────────────────────────────────────────────────────────────────────────

pub struct Keyspace<S> {
    store: S,
}

impl<S: EntryStore> Keyspace<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load a key, dropping it if its expiry has passed.
    fn live(&mut self, key: &str) -> ClientResult<Option<Entry>> {
        match self.store.load(key)? {
            Some(entry) if entry.is_expired(now_ms()) => {
                self.store.remove(key)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn read<R>(
        &mut self,
        key: &str,
        f: impl FnOnce(Option<&Value>) -> ClientResult<R>,
    ) -> ClientResult<R> {
        let entry = self.live(key)?;
        f(entry.as_ref().map(|e| &e.value))
    }

    /// Read-modify-write of one key. Nothing is written back if `f` fails.
    fn write<R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut Option<Entry>) -> ClientResult<R>,
    ) -> ClientResult<R> {
        let mut slot = self.live(key)?;
        let existed = slot.is_some();
        let result = f(&mut slot)?;
        match slot {
            Some(entry) if !entry.value.is_drained() => self.store.store(key, entry)?,
            _ if existed => {
                self.store.remove(key)?;
            }
            _ => {}
        }
        Ok(result)
    }

    // ── strings ──

    pub fn get(&mut self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        self.read(key, |v| match v {
            None => Ok(None),
            Some(Value::String(b)) => Ok(Some(b.clone())),
            Some(_) => wrong_type(),
        })
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> ClientResult<()> {
        self.write(key, |slot| {
            *slot = Some(Entry::new(Value::String(value.to_vec())));
            Ok(())
        })
    }

    pub fn incr(&mut self, key: &str) -> ClientResult<i64> {
        self.write(key, |slot| {
            let current = match slot.as_ref().map(|e| &e.value) {
                None => 0,
                Some(Value::String(b)) => parse_int(b)?,
                Some(_) => return wrong_type(),
            };
            let next = current.checked_add(1).ok_or(ClientError::NotInteger)?;
            *slot_value(slot, || Value::String(Vec::new())) =
                Value::String(next.to_string().into_bytes());
            Ok(next)
        })
    }

    pub fn append(&mut self, key: &str, value: &[u8]) -> ClientResult<usize> {
        self.write(key, |slot| match slot_value(slot, || Value::String(Vec::new())) {
            Value::String(b) => {
                b.extend_from_slice(value);
                Ok(b.len())
            }
            _ => wrong_type(),
        })
    }

    pub fn strlen(&mut self, key: &str) -> ClientResult<usize> {
        self.read(key, |v| match v {
            None => Ok(0),
            Some(Value::String(b)) => Ok(b.len()),
            Some(_) => wrong_type(),
        })
    }

    pub fn mget(&mut self, keys: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        keys.iter()
            .map(|key| match self.get(key) {
                Err(ClientError::WrongType) => Ok(None),
                other => other,
            })
            .collect()
    }

    pub fn mset(&mut self, pairs: &[(&str, &[u8])]) -> ClientResult<()> {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    // ── lists ──

    pub fn lpush(&mut self, key: &str, values: &[&[u8]]) -> ClientResult<i64> {
        self.write(key, |slot| {
            let list = list_mut(slot)?;
            for v in values {
                list.push_front(v.to_vec());
            }
            Ok(list.len() as i64)
        })
    }

    pub fn rpush(&mut self, key: &str, values: &[&[u8]]) -> ClientResult<i64> {
        self.write(key, |slot| {
            let list = list_mut(slot)?;
            for v in values {
                list.push_back(v.to_vec());
            }
            Ok(list.len() as i64)
        })
    }

    pub fn lpop(&mut self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.pop(key, count, VecDeque::pop_front)
    }

    pub fn rpop(&mut self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.pop(key, count, VecDeque::pop_back)
    }

    fn pop(
        &mut self,
        key: &str,
        count: Option<usize>,
        take: fn(&mut VecDeque<Vec<u8>>) -> Option<Vec<u8>>,
    ) -> ClientResult<Vec<Vec<u8>>> {
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(Vec::new());
            }
            let list = list_mut(slot)?;
            Ok((0..count.unwrap_or(1)).map_while(|_| take(list)).collect())
        })
    }

    pub fn llen(&mut self, key: &str) -> ClientResult<i64> {
        self.read(key, |v| Ok(list_of(v)?.map_or(0, |l| l.len() as i64)))
    }

    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        self.read(key, |v| {
            let Some(list) = list_of(v)? else {
                return Ok(Vec::new());
            };
            Ok(index_range(list.len(), start, stop)
                .map(|r| list.range(r).cloned().collect())
                .unwrap_or_default())
        })
    }

    pub fn lindex(&mut self, key: &str, index: i64) -> ClientResult<Option<Vec<u8>>> {
        self.read(key, |v| {
            let Some(list) = list_of(v)? else {
                return Ok(None);
            };
            let idx = if index < 0 {
                list.len() as i64 + index
            } else {
                index
            };
            Ok(usize::try_from(idx).ok().and_then(|i| list.get(i)).cloned())
        })
    }

    // ── hashes ──

    pub fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> ClientResult<i64> {
        self.write(key, |slot| {
            let hash = hash_mut(slot)?;
            Ok(i64::from(hash.insert(field.to_string(), value.to_vec()).is_none()))
        })
    }

    pub fn hget(&mut self, key: &str, field: &str) -> ClientResult<Option<Vec<u8>>> {
        self.read(key, |v| Ok(hash_of(v)?.and_then(|h| h.get(field).cloned())))
    }

    pub fn hgetall(&mut self, key: &str) -> ClientResult<Vec<(String, Vec<u8>)>> {
        self.read(key, |v| {
            Ok(hash_of(v)?
                .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default())
        })
    }

    pub fn hmget(&mut self, key: &str, fields: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        self.read(key, |v| {
            let hash = hash_of(v)?;
            Ok(fields
                .iter()
                .map(|f| hash.and_then(|h| h.get(*f).cloned()))
                .collect())
        })
    }

    pub fn hlen(&mut self, key: &str) -> ClientResult<i64> {
        self.read(key, |v| Ok(hash_of(v)?.map_or(0, |h| h.len() as i64)))
    }

    pub fn hdel(&mut self, key: &str, fields: &[&str]) -> ClientResult<i64> {
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(0);
            }
            let hash = hash_mut(slot)?;
            Ok(fields.iter().filter(|f| hash.remove(**f).is_some()).count() as i64)
        })
    }

    pub fn hincrby(&mut self, key: &str, field: &str, increment: i64) -> ClientResult<i64> {
        self.write(key, |slot| {
            let hash = hash_mut(slot)?;
            let current = hash.get(field).map(|b| parse_int(b)).transpose()?.unwrap_or(0);
            let next = current
                .checked_add(increment)
                .ok_or(ClientError::NotInteger)?;
            hash.insert(field.to_string(), next.to_string().into_bytes());
            Ok(next)
        })
    }

    // ── sets ──

    pub fn sadd(&mut self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.write(key, |slot| {
            let set = set_mut(slot)?;
            Ok(members.iter().filter(|m| set.insert(m.to_vec())).count() as i64)
        })
    }

    pub fn srem(&mut self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(0);
            }
            let set = set_mut(slot)?;
            Ok(members.iter().filter(|m| set.remove(**m)).count() as i64)
        })
    }

    pub fn smembers(&mut self, key: &str) -> ClientResult<Vec<Vec<u8>>> {
        self.read(key, |v| {
            Ok(set_of(v)?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    pub fn sismember(&mut self, key: &str, member: &[u8]) -> ClientResult<bool> {
        self.read(key, |v| Ok(set_of(v)?.is_some_and(|s| s.contains(member))))
    }

    pub fn scard(&mut self, key: &str) -> ClientResult<i64> {
        self.read(key, |v| Ok(set_of(v)?.map_or(0, |s| s.len() as i64)))
    }

    pub fn spop(&mut self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(Vec::new());
            }
            let set = set_mut(slot)?;
            let picked: Vec<Vec<u8>> = set
                .iter()
                .cloned()
                .choose_multiple(&mut rand::thread_rng(), count.unwrap_or(1));
            for member in &picked {
                set.remove(member);
            }
            Ok(picked)
        })
    }

    pub fn srandmember(&mut self, key: &str, count: Option<usize>) -> ClientResult<Vec<Vec<u8>>> {
        self.read(key, |v| {
            Ok(set_of(v)?
                .map(|s| {
                    s.iter()
                        .cloned()
                        .choose_multiple(&mut rand::thread_rng(), count.unwrap_or(1))
                })
                .unwrap_or_default())
        })
    }

    // ── sorted sets ──

    pub fn zadd(&mut self, key: &str, members: &[(f64, &[u8])]) -> ClientResult<i64> {
        if members.iter().any(|(score, _)| score.is_nan()) {
            return Err(ClientError::InvalidArgument("score is not a number".into()));
        }
        self.write(key, |slot| {
            let zset = zset_mut(slot)?;
            let mut added = 0;
            for (score, member) in members {
                match zset.iter_mut().find(|z| z.member.as_slice() == *member) {
                    Some(existing) => existing.score = *score,
                    None => {
                        zset.push(ZMember {
                            member: member.to_vec(),
                            score: *score,
                        });
                        added += 1;
                    }
                }
            }
            sort_zset(zset);
            Ok(added)
        })
    }

    pub fn zrem(&mut self, key: &str, members: &[&[u8]]) -> ClientResult<i64> {
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(0);
            }
            let zset = zset_mut(slot)?;
            let before = zset.len();
            zset.retain(|z| !members.contains(&z.member.as_slice()));
            Ok((before - zset.len()) as i64)
        })
    }

    pub fn zrange(&mut self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        self.read(key, |v| {
            let Some(zset) = zset_of(v)? else {
                return Ok(Vec::new());
            };
            Ok(index_range(zset.len(), start, stop)
                .map(|r| zset[r].iter().map(|z| z.member.clone()).collect())
                .unwrap_or_default())
        })
    }

    pub fn zrangebyscore(&mut self, key: &str, min: f64, max: f64) -> ClientResult<Vec<Vec<u8>>> {
        self.read(key, |v| {
            Ok(zset_of(v)?
                .map(|z| {
                    z.iter()
                        .filter(|m| m.score >= min && m.score <= max)
                        .map(|m| m.member.clone())
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    pub fn zscore(&mut self, key: &str, member: &[u8]) -> ClientResult<Option<f64>> {
        self.read(key, |v| {
            Ok(zset_of(v)?.and_then(|z| {
                z.iter()
                    .find(|m| m.member.as_slice() == member)
                    .map(|m| m.score)
            }))
        })
    }

    pub fn zrank(&mut self, key: &str, member: &[u8]) -> ClientResult<Option<i64>> {
        self.read(key, |v| {
            Ok(zset_of(v)?.and_then(|z| {
                z.iter()
                    .position(|m| m.member.as_slice() == member)
                    .map(|p| p as i64)
            }))
        })
    }

    pub fn zcard(&mut self, key: &str) -> ClientResult<i64> {
        self.read(key, |v| Ok(zset_of(v)?.map_or(0, |z| z.len() as i64)))
    }

    pub fn zcount(&mut self, key: &str, min: f64, max: f64) -> ClientResult<i64> {
        self.read(key, |v| {
            Ok(zset_of(v)?.map_or(0, |z| {
                z.iter()
                    .filter(|m| m.score >= min && m.score <= max)
                    .count() as i64
            }))
        })
    }

    // ── streams ──

    pub fn xadd(&mut self, key: &str, id: &str, fields: &[(&str, &[u8])]) -> ClientResult<String> {
        self.write(key, |slot| {
            let stream = stream_mut(slot)?;
            let last = stream.last_id;
            let next = if id == "*" {
                let now = now_ms();
                if now > last.0 {
                    StreamId(now, 0)
                } else {
                    StreamId(last.0, last.1 + 1)
                }
            } else {
                StreamId::parse(id, 0)?
            };
            if next <= last {
                return Err(ClientError::InvalidArgument(format!(
                    "stream ID {next} is equal or smaller than the top item {last}"
                )));
            }
            stream.records.push(StreamRecord {
                id: next,
                fields: fields
                    .iter()
                    .map(|(f, v)| (f.to_string(), v.to_vec()))
                    .collect(),
            });
            stream.last_id = next;
            Ok(next.to_string())
        })
    }

    pub fn xlen(&mut self, key: &str) -> ClientResult<i64> {
        self.read(key, |v| Ok(stream_of(v)?.map_or(0, |s| s.records.len() as i64)))
    }

    pub fn xrange(&mut self, key: &str, start: &str, end: &str) -> ClientResult<Vec<StreamEntry>> {
        let (lo, hi) = (StreamId::parse_start(start)?, StreamId::parse_end(end)?);
        self.read(key, |v| {
            Ok(stream_of(v)?
                .map(|s| {
                    s.records
                        .iter()
                        .filter(|r| r.id >= lo && r.id <= hi)
                        .map(StreamRecord::to_entry)
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    pub fn xrevrange(
        &mut self,
        key: &str,
        end: &str,
        start: &str,
    ) -> ClientResult<Vec<StreamEntry>> {
        let mut entries = self.xrange(key, start, end)?;
        entries.reverse();
        Ok(entries)
    }

    pub fn xread(&mut self, keys: &[&str], ids: &[&str]) -> ClientResult<Vec<StreamEntry>> {
        if keys.len() != ids.len() {
            return Err(ClientError::InvalidArgument(
                "XREAD needs one ID per stream".into(),
            ));
        }
        let mut out = Vec::new();
        for (key, id) in keys.iter().zip(ids) {
            let after = StreamId::parse(id, 0)?;
            self.read(key, |v| {
                if let Some(stream) = stream_of(v)? {
                    out.extend(
                        stream
                            .records
                            .iter()
                            .filter(|r| r.id > after)
                            .map(StreamRecord::to_entry),
                    );
                }
                Ok(())
            })?;
        }
        Ok(out)
    }

    pub fn xdel(&mut self, key: &str, ids: &[&str]) -> ClientResult<i64> {
        let targets = ids
            .iter()
            .map(|id| StreamId::parse(id, 0))
            .collect::<ClientResult<Vec<_>>>()?;
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(0);
            }
            let stream = stream_mut(slot)?;
            let before = stream.records.len();
            stream.records.retain(|r| !targets.contains(&r.id));
            Ok((before - stream.records.len()) as i64)
        })
    }

    pub fn xtrim(&mut self, key: &str, maxlen: i64) -> ClientResult<i64> {
        let maxlen = usize::try_from(maxlen)
            .map_err(|_| ClientError::InvalidArgument("MAXLEN must be positive".into()))?;
        self.write(key, |slot| {
            if slot.is_none() {
                return Ok(0);
            }
            let stream = stream_mut(slot)?;
            let excess = stream.records.len().saturating_sub(maxlen);
            stream.records.drain(..excess);
            Ok(excess as i64)
        })
    }

    // ── keys ──

    pub fn del(&mut self, keys: &[&str]) -> ClientResult<i64> {
        let mut removed = 0;
        for key in keys {
            if self.live(key)?.is_some() && self.store.remove(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn exists(&mut self, keys: &[&str]) -> ClientResult<i64> {
        let mut found = 0;
        for key in keys {
            if self.live(key)?.is_some() {
                found += 1;
            }
        }
        Ok(found)
    }

    pub fn key_type(&mut self, key: &str) -> ClientResult<String> {
        self.read(key, |v| Ok(v.map_or("none", Value::type_name).to_string()))
    }

    pub fn expire(&mut self, key: &str, seconds: u64) -> ClientResult<bool> {
        self.write(key, |slot| match slot {
            None => Ok(false),
            Some(entry) => {
                entry.expires_at_ms = Some(now_ms().saturating_add(seconds.saturating_mul(1000)));
                Ok(true)
            }
        })
    }

    pub fn ttl(&mut self, key: &str) -> ClientResult<i64> {
        Ok(match self.live(key)? {
            None => -2,
            Some(Entry {
                expires_at_ms: None,
                ..
            }) => -1,
            Some(Entry {
                expires_at_ms: Some(at),
                ..
            }) => (at.saturating_sub(now_ms()).saturating_add(500) / 1000) as i64,
        })
    }

    // ── utility ──

    pub fn flushdb(&mut self) -> ClientResult<()> {
        self.store.clear()
    }

    pub fn ping(&mut self) -> ClientResult<()> {
        self.store.ping()
    }

    pub fn commit(&mut self) -> ClientResult<()> {
        self.store.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore(HashMap<String, Entry>);

    impl EntryStore for MapStore {
        fn load(&mut self, key: &str) -> ClientResult<Option<Entry>> {
            Ok(self.0.get(key).cloned())
        }
        fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()> {
            self.0.insert(key.to_string(), entry);
            Ok(())
        }
        fn remove(&mut self, key: &str) -> ClientResult<bool> {
            Ok(self.0.remove(key).is_some())
        }
        fn clear(&mut self) -> ClientResult<()> {
            self.0.clear();
            Ok(())
        }
    }

    fn keyspace() -> Keyspace<MapStore> {
        Keyspace::new(MapStore::default())
    }

    #[test]
    fn test_strings_and_counters() {
        let mut ks = keyspace();
        assert_eq!(ks.get("k").unwrap(), None);
        ks.set("k", b"hello").unwrap();
        assert_eq!(ks.append("k", b" world").unwrap(), 11);
        assert_eq!(ks.strlen("k").unwrap(), 11);
        assert_eq!(ks.incr("k"), Err(ClientError::NotInteger));

        assert_eq!(ks.incr("c").unwrap(), 1);
        assert_eq!(ks.incr("c").unwrap(), 2);
        assert_eq!(ks.get("c").unwrap(), Some(b"2".to_vec()));

        ks.mset(&[("a", b"1".as_slice()), ("b", b"2".as_slice())]).unwrap();
        ks.rpush("l", &[b"x".as_slice()]).unwrap();
        assert_eq!(
            ks.mget(&["a", "missing", "l"]).unwrap(),
            vec![Some(b"1".to_vec()), None, None]
        );
    }

    #[test]
    fn test_wrong_type_is_an_error_and_leaves_value_intact() {
        let mut ks = keyspace();
        ks.set("k", b"v").unwrap();
        assert_eq!(ks.lpush("k", &[b"x".as_slice()]), Err(ClientError::WrongType));
        assert_eq!(ks.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_lists() {
        let mut ks = keyspace();
        ks.rpush("l", &[b"a".as_slice(), b"b".as_slice(), b"c".as_slice()])
            .unwrap();
        assert_eq!(ks.lpush("l", &[b"z".as_slice()]).unwrap(), 4);
        assert_eq!(
            ks.lrange("l", 0, -1).unwrap(),
            vec![b"z".to_vec(), b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(ks.lrange("l", 1, 99).unwrap().len(), 3);
        assert_eq!(ks.lindex("l", -1).unwrap(), Some(b"c".to_vec()));
        assert_eq!(ks.lindex("l", 10).unwrap(), None);
        assert_eq!(ks.rpop("l", Some(2)).unwrap(), vec![b"c".to_vec(), b"b".to_vec()]);
        assert_eq!(ks.lpop("l", None).unwrap(), vec![b"z".to_vec()]);
        assert_eq!(ks.lpop("l", None).unwrap(), vec![b"a".to_vec()]);
        // drained lists vanish
        assert_eq!(ks.key_type("l").unwrap(), "none");
        assert!(ks.lpop("l", None).unwrap().is_empty());
    }

    #[test]
    fn test_hashes() {
        let mut ks = keyspace();
        assert_eq!(ks.hset("h", "f1", b"v1").unwrap(), 1);
        assert_eq!(ks.hset("h", "f1", b"v2").unwrap(), 0);
        assert_eq!(ks.hget("h", "f1").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(ks.hincrby("h", "n", 5).unwrap(), 5);
        assert_eq!(ks.hincrby("h", "f1", 1), Err(ClientError::NotInteger));
        assert_eq!(ks.hlen("h").unwrap(), 2);
        assert_eq!(
            ks.hmget("h", &["f1", "nope"]).unwrap(),
            vec![Some(b"v2".to_vec()), None]
        );
        assert_eq!(ks.hdel("h", &["f1", "nope"]).unwrap(), 1);
        assert_eq!(ks.hgetall("h").unwrap(), vec![("n".to_string(), b"5".to_vec())]);
    }

    #[test]
    fn test_sets() {
        let mut ks = keyspace();
        assert_eq!(ks.sadd("s", &[b"a".as_slice(), b"b".as_slice(), b"a".as_slice()]).unwrap(), 2);
        assert!(ks.sismember("s", b"a").unwrap());
        assert_eq!(ks.scard("s").unwrap(), 2);
        assert_eq!(ks.srandmember("s", Some(5)).unwrap().len(), 2);
        assert_eq!(ks.spop("s", None).unwrap().len(), 1);
        assert_eq!(ks.scard("s").unwrap(), 1);
        assert_eq!(ks.srem("s", &[b"a".as_slice(), b"b".as_slice()]).unwrap(), 1);
        assert!(ks.smembers("s").unwrap().is_empty());
    }

    #[test]
    fn test_sorted_sets() {
        let mut ks = keyspace();
        ks.zadd("z", &[(3.0, b"c".as_slice()), (1.0, b"a".as_slice()), (2.0, b"b".as_slice())])
            .unwrap();
        assert_eq!(ks.zadd("z", &[(0.5, b"c".as_slice())]).unwrap(), 0);
        assert_eq!(
            ks.zrange("z", 0, -1).unwrap(),
            vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]
        );
        assert_eq!(ks.zrank("z", b"b").unwrap(), Some(2));
        assert_eq!(ks.zscore("z", b"a").unwrap(), Some(1.0));
        assert_eq!(ks.zcount("z", 0.0, 1.5).unwrap(), 2);
        assert_eq!(ks.zrangebyscore("z", 1.0, 2.0).unwrap().len(), 2);
        assert_eq!(ks.zrem("z", &[b"a".as_slice()]).unwrap(), 1);
        assert_eq!(ks.zcard("z").unwrap(), 2);
    }

    #[test]
    fn test_streams() {
        let mut ks = keyspace();
        assert_eq!(ks.xadd("x", "1-0", &[("f", b"1".as_slice())]).unwrap(), "1-0");
        assert_eq!(ks.xadd("x", "2-0", &[("f", b"2".as_slice())]).unwrap(), "2-0");
        assert!(ks.xadd("x", "2-0", &[("f", b"3".as_slice())]).is_err());
        let auto = ks.xadd("x", "*", &[("f", b"3".as_slice())]).unwrap();
        assert_ne!(auto, "2-0");

        assert_eq!(ks.xlen("x").unwrap(), 3);
        assert_eq!(ks.xrange("x", "-", "+").unwrap().len(), 3);
        assert_eq!(ks.xrange("x", "2", "2").unwrap()[0].id, "2-0");
        assert_eq!(ks.xrevrange("x", "+", "-").unwrap()[0].id, auto);
        assert_eq!(ks.xread(&["x"], &["1-0"]).unwrap().len(), 2);
        assert_eq!(ks.xdel("x", &["1-0", "9-9"]).unwrap(), 1);
        assert_eq!(ks.xtrim("x", 1).unwrap(), 1);
        assert_eq!(ks.xlen("x").unwrap(), 1);
    }

    #[test]
    fn test_keys_and_expiry() {
        let mut ks = keyspace();
        ks.set("a", b"1").unwrap();
        ks.set("b", b"2").unwrap();
        assert_eq!(ks.exists(&["a", "b", "c"]).unwrap(), 2);
        assert_eq!(ks.ttl("a").unwrap(), -1);
        assert_eq!(ks.ttl("c").unwrap(), -2);
        assert!(ks.expire("a", 100).unwrap());
        assert!(!ks.expire("c", 100).unwrap());
        let ttl = ks.ttl("a").unwrap();
        assert!((99..=100).contains(&ttl), "ttl {ttl}");

        ks.expire("b", 0).unwrap();
        assert_eq!(ks.get("b").unwrap(), None);
        assert_eq!(ks.del(&["a", "b"]).unwrap(), 1);

        ks.set("c", b"3").unwrap();
        ks.flushdb().unwrap();
        assert_eq!(ks.exists(&["c"]).unwrap(), 0);
    }
}
