//! Priority-ordered chain of store tiers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::{Entry, Store};
use crate::error::Result;

/// Composes several stores in priority order (fastest first).
///
/// Reads stop at the first hit and asynchronously backfill all faster
/// tiers. Writes and removals fan out to every tier concurrently,
/// best-effort: a single tier's outage never prevents serving from, or
/// repopulating, the others.
pub struct TieredStore {
  tiers: Vec<Arc<dyn Store>>,
}

impl TieredStore {
  pub fn new(tiers: Vec<Arc<dyn Store>>) -> Self {
    Self { tiers }
  }

  pub fn tier_count(&self) -> usize {
    self.tiers.len()
  }
}

#[async_trait]
impl Store for TieredStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>> {
    for (index, tier) in self.tiers.iter().enumerate() {
      match tier.get(key).await {
        Ok(Some(entry)) => {
          for faster in &self.tiers[..index] {
            let faster = Arc::clone(faster);
            let key = key.to_string();
            let entry = entry.clone();
            tokio::spawn(async move {
              if let Err(err) = faster.set(&key, entry).await {
                warn!(%err, key = %key, "tier backfill failed");
              }
            });
          }
          if index > 0 {
            debug!(tier = index, key = %key, "hit on slower tier, backfilling");
          }
          return Ok(Some(entry));
        }
        Ok(None) => continue,
        Err(err) => {
          warn!(%err, tier = index, key = %key, "tier read failed, treating as miss");
          continue;
        }
      }
    }
    Ok(None)
  }

  async fn set(&self, key: &str, entry: Entry) -> Result<()> {
    let writes = self.tiers.iter().map(|tier| tier.set(key, entry.clone()));
    for (index, result) in join_all(writes).await.into_iter().enumerate() {
      if let Err(err) = result {
        warn!(%err, tier = index, key = %key, "tier write failed, skipping");
      }
    }
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let removals = self.tiers.iter().map(|tier| tier.remove(key));
    for (index, result) in join_all(removals).await.into_iter().enumerate() {
      if let Err(err) = result {
        warn!(%err, tier = index, key = %key, "tier removal failed, skipping");
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::swr::MemoryStore;
  use chrono::{Duration, Utc};
  use serde_json::json;
  use std::time::Duration as StdDuration;

  struct FailingStore;

  #[async_trait]
  impl Store for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Entry>> {
      Err(Error::Store("tier down".to_string()))
    }

    async fn set(&self, _key: &str, _entry: Entry) -> Result<()> {
      Err(Error::Store("tier down".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
      Err(Error::Store("tier down".to_string()))
    }
  }

  fn entry(data: serde_json::Value) -> Entry {
    let now = Utc::now();
    Entry {
      data,
      fresh_until: now + Duration::seconds(5),
      stale_until: now + Duration::seconds(10),
    }
  }

  #[tokio::test]
  async fn reads_stop_at_first_hit_and_backfill() {
    let fast = Arc::new(MemoryStore::new());
    let slow = Arc::new(MemoryStore::new());
    slow.set("k", entry(json!(1))).await.unwrap();

    let tiered = TieredStore::new(vec![fast.clone() as Arc<dyn Store>, slow.clone()]);
    let got = tiered.get("k").await.unwrap().unwrap();
    assert_eq!(got.data, json!(1));

    // backfill of the faster tier is asynchronous
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    assert_eq!(fast.get("k").await.unwrap().unwrap().data, json!(1));
  }

  #[tokio::test]
  async fn writes_fan_out_to_all_tiers() {
    let fast = Arc::new(MemoryStore::new());
    let slow = Arc::new(MemoryStore::new());
    let tiered = TieredStore::new(vec![fast.clone() as Arc<dyn Store>, slow.clone()]);

    tiered.set("k", entry(json!(2))).await.unwrap();
    assert_eq!(fast.get("k").await.unwrap().unwrap().data, json!(2));
    assert_eq!(slow.get("k").await.unwrap().unwrap().data, json!(2));

    tiered.remove("k").await.unwrap();
    assert_eq!(fast.get("k").await.unwrap(), None);
    assert_eq!(slow.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn failing_tier_is_skipped() {
    let healthy = Arc::new(MemoryStore::new());
    let tiered = TieredStore::new(vec![Arc::new(FailingStore) as Arc<dyn Store>, healthy.clone()]);

    // writes are best-effort past the failing tier
    tiered.set("k", entry(json!(3))).await.unwrap();
    assert_eq!(healthy.get("k").await.unwrap().unwrap().data, json!(3));

    // the failing tier reads as a miss, the healthy tier serves
    let got = tiered.get("k").await.unwrap().unwrap();
    assert_eq!(got.data, json!(3));
  }
}
