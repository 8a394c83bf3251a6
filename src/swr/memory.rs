//! In-process store tier.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Entry, Store};
use crate::error::Result;

/// A fast in-process tier backed by a hash map. Typically the first tier in
/// a [`super::TieredStore`] chain.
#[derive(Default)]
pub struct MemoryStore {
  entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<Entry>> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: &str, entry: Entry) -> Result<()> {
    self.entries.write().await.insert(key.to_string(), entry);
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.entries.write().await.remove(key);
    Ok(())
  }
}
