//! Shared (on-disk) SQLite store tier.
//!
//! Slower than [`super::MemoryStore`] but shared across processes and
//! restarts; typically the second tier in a chain.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Entry, Store};
use crate::error::{Error, Result};

/// SQLite-backed store tier.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the store table. Freshness windows are epoch milliseconds.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS swr_cache (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    fresh_until INTEGER NOT NULL,
    stale_until INTEGER NOT NULL
);
"#;

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Store(format!("failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      Error::Store(format!("failed to open store at {}: {}", path.display(), e))
    })?;
    Self::from_connection(conn)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path).map_err(|e| {
      Error::Store(format!("failed to open store at {}: {}", path.display(), e))
    })?;
    Self::from_connection(conn)
  }

  /// In-memory database, useful in tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::Store(format!("failed to open in-memory store: {}", e)))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Store("could not determine data directory".to_string()))?;
    Ok(data_dir.join("qcache").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock_conn()?;
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| Error::Store(format!("failed to run migrations: {}", e)))
  }

  fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Store(format!("lock poisoned: {}", e)))
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>> {
    let conn = self.lock_conn()?;
    let row: Option<(String, i64, i64)> = conn
      .query_row(
        "SELECT data, fresh_until, stale_until FROM swr_cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| Error::Store(format!("failed to read entry: {}", e)))?;

    let Some((data, fresh_until, stale_until)) = row else {
      return Ok(None);
    };
    let data = serde_json::from_str(&data)
      .map_err(|e| Error::Store(format!("failed to decode entry: {}", e)))?;
    Ok(Some(Entry {
      data,
      fresh_until: millis_to_datetime(fresh_until)?,
      stale_until: millis_to_datetime(stale_until)?,
    }))
  }

  async fn set(&self, key: &str, entry: Entry) -> Result<()> {
    let data = serde_json::to_string(&entry.data)
      .map_err(|e| Error::Store(format!("failed to encode entry: {}", e)))?;
    let conn = self.lock_conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO swr_cache (key, data, fresh_until, stale_until)
         VALUES (?, ?, ?, ?)",
        params![
          key,
          data,
          entry.fresh_until.timestamp_millis(),
          entry.stale_until.timestamp_millis()
        ],
      )
      .map_err(|e| Error::Store(format!("failed to write entry: {}", e)))?;
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock_conn()?;
    conn
      .execute("DELETE FROM swr_cache WHERE key = ?", params![key])
      .map_err(|e| Error::Store(format!("failed to remove entry: {}", e)))?;
    Ok(())
  }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_millis(millis)
    .ok_or_else(|| Error::Store(format!("timestamp out of range: {}", millis)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use serde_json::json;

  #[tokio::test]
  async fn round_trips_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    let entry = Entry {
      data: json!({"data": [{"id": 1}], "count": 1}),
      fresh_until: now + Duration::seconds(1),
      stale_until: now + Duration::seconds(2),
    };

    store.set("k", entry.clone()).await.unwrap();
    let got = store.get("k").await.unwrap().unwrap();
    assert_eq!(got.data, entry.data);
    // millisecond precision survives the round trip
    assert_eq!(
      got.fresh_until.timestamp_millis(),
      entry.fresh_until.timestamp_millis()
    );

    store.remove("k").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn overwrites_existing_keys() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    let entry = |v: i64| Entry {
      data: json!(v),
      fresh_until: now,
      stale_until: now,
    };

    store.set("k", entry(1)).await.unwrap();
    store.set("k", entry(2)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap().unwrap().data, json!(2));
  }
}
