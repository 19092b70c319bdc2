//! Key-value stores backing the single-slot channel.
//!
//! Each store keeps one value per key and overwrites it on every put. No
//! versioning and no queue: readers only ever see the latest write.
//!
//! - `RedisSlotStore`: network store addressed by host and port
//! - `SqliteSlotStore`: host-local database file, for machines with no store server
//! - `MemorySlotStore`: in-process map shared between clones

use anyhow::{Context, Result};
use redis::ConnectionLike;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A shared store holding one value per key.
pub trait SlotStore {
    /// Overwrite the value stored under `key`.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Current value under `key`, `None` if nothing was ever written.
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;
}

impl<S: SlotStore + ?Sized> SlotStore for Box<S> {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }
}

// ----------------------------------------------------------------------------
// Redis
// ----------------------------------------------------------------------------

/// Slot store on a Redis server.
pub struct RedisSlotStore {
    client: redis::Client,
    conn: Option<redis::Connection>,
    io_timeout: Duration,
    url: String,
}

impl RedisSlotStore {
    /// Connect to `host:port` and check the server answers.
    pub fn connect(host: &str, port: u16, io_timeout: Duration) -> Result<Self> {
        let url = format!("redis://{}:{}/", host, port);
        let client =
            redis::Client::open(url.as_str()).with_context(|| format!("invalid redis url {}", url))?;
        let mut store = Self {
            client,
            conn: None,
            io_timeout,
            url,
        };
        let target = store.url.clone();
        redis::cmd("PING")
            .query::<String>(store.connection()?)
            .with_context(|| format!("ping {}", target))?;
        log::info!("RedisSlotStore: connected to {}", target);
        Ok(store)
    }

    fn connection(&mut self) -> Result<&mut redis::Connection> {
        if self.conn.as_ref().is_some_and(|conn| !conn.is_open()) {
            self.conn = None;
        }
        if self.conn.is_none() {
            let conn = self
                .client
                .get_connection_with_timeout(self.io_timeout)
                .with_context(|| format!("connect {}", self.url))?;
            conn.set_read_timeout(Some(self.io_timeout))?;
            conn.set_write_timeout(Some(self.io_timeout))?;
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .context("redis connection unavailable")
    }

    fn drop_connection_on_io_error(&mut self, err: &redis::RedisError) {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            self.conn = None;
        }
    }
}

impl SlotStore for RedisSlotStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        use redis::Commands;

        let result = self.connection()?.set::<_, _, ()>(key, value);
        if let Err(err) = &result {
            self.drop_connection_on_io_error(err);
        }
        result.with_context(|| format!("SET {}", key))
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        use redis::Commands;

        let result = self.connection()?.get::<_, Option<Vec<u8>>>(key);
        if let Err(err) = &result {
            self.drop_connection_on_io_error(err);
        }
        result.with_context(|| format!("GET {}", key))
    }
}

// ----------------------------------------------------------------------------
// SQLite
// ----------------------------------------------------------------------------

/// Slot store in a SQLite file shared by every process on the host.
pub struct SqliteSlotStore {
    conn: Connection,
}

impl SqliteSlotStore {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open slot database {}", path.display()))?;
        conn.busy_timeout(busy_timeout)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS slots (
              key TEXT PRIMARY KEY,
              value BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl SlotStore for SqliteSlotStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO slots (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM slots WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }
}

// ----------------------------------------------------------------------------
// In-memory
// ----------------------------------------------------------------------------

/// Process-local store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemorySlotStore {
    slots: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("slot map poisoned"))?;
        slots.insert(key.to_string(), value.into());
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("slot map poisoned"))?;
        Ok(slots.get(key).map(|value| value.to_vec()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites_and_shares_between_clones() -> Result<()> {
        let mut writer = MemorySlotStore::new();
        let mut reader = writer.clone();
        assert_eq!(reader.get("cam")?, None);

        writer.put("cam", b"first")?;
        writer.put("cam", b"second")?;
        assert_eq!(reader.get("cam")?, Some(b"second".to_vec()));
        assert_eq!(reader.get("other")?, None);
        Ok(())
    }

    #[test]
    fn sqlite_store_last_writer_wins_across_connections() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("slots.db");
        let mut writer = SqliteSlotStore::open(&path, Duration::from_secs(1))?;
        let mut reader = SqliteSlotStore::open(&path, Duration::from_secs(1))?;

        assert_eq!(reader.get("cam")?, None);
        writer.put("cam", &[1, 2, 3])?;
        writer.put("cam", &[4, 5])?;
        assert_eq!(reader.get("cam")?, Some(vec![4, 5]));
        Ok(())
    }
}
