//! Stale-while-revalidate tiered caching.
//!
//! A [`Store`] is one backing tier with `get`/`set`/`remove`. Tiers compose
//! into a [`TieredStore`] (fast in-process first, slower shared store
//! second); [`SwrCache`] adds freshness windows, background revalidation,
//! and in-flight request de-duplication on top of any store.

mod cache;
mod memory;
mod sqlite;
mod tiered;

pub use cache::SwrCache;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use tiered::TieredStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A stored value with its freshness windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub data: Value,
  /// Until this instant the entry is served without any background work.
  pub fresh_until: DateTime<Utc>,
  /// Until this instant a stale entry may still be served while a
  /// revalidation runs in the background; past it the entry is expired.
  pub stale_until: DateTime<Utc>,
}

impl Entry {
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    now < self.fresh_until
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.stale_until
  }
}

/// One backing store tier.
///
/// Implementations report failures as `Error::Store`; callers treat a
/// failing tier as a miss for reads and skip it for writes.
#[async_trait]
pub trait Store: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<Entry>>;
  async fn set(&self, key: &str, entry: Entry) -> Result<()>;
  async fn remove(&self, key: &str) -> Result<()>;
}

/// A loader result is written back only when it carries data: an object
/// with a non-null `data` field or a numeric `count`, or any other
/// non-null value.
pub fn is_empty_result(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::Object(map) => match (map.get("data"), map.get("count")) {
      (None, None) => false,
      (data, count) => {
        data.map_or(true, Value::is_null) && !count.map_or(false, Value::is_number)
      }
    },
    _ => false,
  }
}
