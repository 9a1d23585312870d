//! SQLite backend (via rusqlite).
//!
//! Configuration: WAL mode, NORMAL synchronous, WITHOUT ROWID entry table.
//! Each key holds one JSON-encoded entry; typed commands are evaluated by
//! the shared keyspace engine above this store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::keyspace::{Entry, EntryStore};
use super::store_client::StoreClient;
use crate::client::Durability;
use crate::error::{ClientError, ClientResult};

pub struct SqliteStore {
    conn: Connection,
}

fn storage(context: &str) -> impl Fn(rusqlite::Error) -> ClientError + '_ {
    move |e| ClientError::Storage(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> ClientResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ClientError::Connection(format!("SQLite open {}: {e}", path.display())))?;

        // Tune for throughput.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA mmap_size = 268435456;
             PRAGMA temp_store = MEMORY;
             CREATE TABLE IF NOT EXISTS entries (
                 key   TEXT PRIMARY KEY,
                 entry BLOB NOT NULL
             ) WITHOUT ROWID;",
        )
        .map_err(storage("SQLite setup"))?;

        Ok(Self { conn })
    }
}

impl EntryStore for SqliteStore {
    fn load(&mut self, key: &str) -> ClientResult<Option<Entry>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT entry FROM entries WHERE key = ?1")
            .map_err(storage("prepare load"))?;
        let blob: Option<Vec<u8>> = stmt
            .query_row(params![key], |row| row.get(0))
            .optional()
            .map_err(storage("load"))?;
        blob.map(|b| {
            serde_json::from_slice(&b)
                .map_err(|e| ClientError::Storage(format!("decode entry `{key}`: {e}")))
        })
        .transpose()
    }

    fn store(&mut self, key: &str, entry: Entry) -> ClientResult<()> {
        let blob = serde_json::to_vec(&entry)
            .map_err(|e| ClientError::Storage(format!("encode entry `{key}`: {e}")))?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO entries (key, entry) VALUES (?1, ?2)")
            .map_err(storage("prepare store"))?;
        stmt.execute(params![key, blob]).map_err(storage("store"))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> ClientResult<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM entries WHERE key = ?1")
            .map_err(storage("prepare remove"))?;
        let removed = stmt.execute(params![key]).map_err(storage("remove"))?;
        Ok(removed > 0)
    }

    fn clear(&mut self) -> ClientResult<()> {
        self.conn
            .execute("DELETE FROM entries", [])
            .map_err(storage("clear"))?;
        Ok(())
    }

    fn sync(&mut self) -> ClientResult<()> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(FULL);")
            .map_err(storage("checkpoint"))
    }

    fn ping(&mut self) -> ClientResult<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| ClientError::Connection(format!("SQLite ping: {e}")))
    }
}

pub type SqliteClient = StoreClient<SqliteStore>;

pub fn sqlite_client(name: &str, path: &Path) -> ClientResult<SqliteClient> {
    let store = SqliteStore::open(path)?;
    Ok(StoreClient::new(
        name,
        format!("sqlite-{}", rusqlite::version()),
        Durability::FileBacked,
        store,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;

    #[tokio::test]
    async fn test_entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.sqlite3");
        {
            let client = sqlite_client("sqlite", &path).unwrap();
            client.hset("hash_0", "field_0", b"v").await.unwrap();
            client.rpush("list_0", &[b"a".as_slice(), b"b".as_slice()]).await.unwrap();
            client.commit().await.unwrap();
            assert_eq!(client.durability(), Durability::FileBacked);
        }
        let client = sqlite_client("sqlite", &path).unwrap();
        assert_eq!(
            client.hget("hash_0", "field_0").await.unwrap(),
            Some(b"v".to_vec())
        );
        assert_eq!(client.llen("list_0").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_flush_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let client = sqlite_client("sqlite", &dir.path().join("kv.sqlite3")).unwrap();
        client.ping().await.unwrap();
        client.set("key_0", b"x").await.unwrap();
        client.set("key_1", b"y").await.unwrap();
        assert_eq!(client.del(&["key_0", "key_9"]).await.unwrap(), 1);
        client.flushdb().await.unwrap();
        assert_eq!(client.exists(&["key_1"]).await.unwrap(), 0);
    }

    #[test]
    fn test_store_replace_and_remove() {
        use super::super::keyspace::Value;

        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("kv.sqlite3")).unwrap();
        store.store("key_0", Entry::new(Value::String(b"x".to_vec()))).unwrap();
        store.store("key_0", Entry::new(Value::String(b"y".to_vec()))).unwrap();
        assert!(matches!(
            store.load("key_0").unwrap().map(|e| e.value),
            Some(Value::String(v)) if v == b"y"
        ));
        assert!(store.remove("key_0").unwrap());
        assert!(!store.remove("key_0").unwrap());
        assert!(store.load("key_0").unwrap().is_none());
    }
}
