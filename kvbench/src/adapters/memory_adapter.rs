//! In-process hash map backend.

use std::collections::HashMap;

use super::keyspace::{Entry, EntryStore};
use super::store_client::StoreClient;
use crate::client::Durability;
use crate::error::ClientResult;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Entry>,
}

impl EntryStore for MemoryStore {
    fn load(&mut self, key: &str) -> ClientResult<Option<Entry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> ClientResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&mut self) -> ClientResult<()> {
        self.entries.clear();
        Ok(())
    }
}

pub type MemoryClient = StoreClient<MemoryStore>;

pub fn memory_client(name: &str) -> MemoryClient {
    StoreClient::new(
        name,
        concat!("memory-", env!("CARGO_PKG_VERSION")),
        Durability::Volatile,
        MemoryStore::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;

    #[tokio::test]
    async fn test_memory_client_roundtrip() {
        let client = memory_client("memory");
        client.ping().await.unwrap();
        client.set("key_0", b"v").await.unwrap();
        assert_eq!(client.get("key_0").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(client.durability(), Durability::Volatile);

        client.flushdb().await.unwrap();
        assert_eq!(client.exists(&["key_0"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_delay_is_applied() {
        let client = memory_client("slow").with_round_trip(std::time::Duration::from_millis(5));
        let start = std::time::Instant::now();
        client.get("missing").await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));
    }
}
