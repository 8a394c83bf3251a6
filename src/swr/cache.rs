//! Stale-while-revalidate orchestration on top of a store.
//!
//! A fresh hit returns immediately with no background work. A stale but
//! not yet expired hit returns the cached value and fires the loader in
//! the background. An expired or missing entry awaits the loader. For any
//! one key, at most one loader is in flight: concurrent callers share the
//! same future instead of issuing a second load.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::{is_empty_result, Entry, Store};
use crate::error::{Error, Result};

type LoadResult = std::result::Result<Value, String>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// A namespaced stale-while-revalidate cache over any [`Store`].
pub struct SwrCache<S: Store> {
  store: Arc<S>,
  namespace: String,
  fresh: Duration,
  stale: Duration,
  inflight: Arc<Mutex<HashMap<String, SharedLoad>>>,
}

impl<S: Store + 'static> SwrCache<S> {
  /// Create a cache over the given store. Defaults: one minute fresh, five
  /// minutes until expiry.
  pub fn new(store: S, namespace: &str) -> Self {
    Self {
      store: Arc::new(store),
      namespace: namespace.to_string(),
      fresh: Duration::minutes(1),
      stale: Duration::minutes(5),
      inflight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Set the freshness windows, both measured from the time of a write.
  /// `stale` is the total lifetime and should not be shorter than `fresh`.
  pub fn with_windows(mut self, fresh: Duration, stale: Duration) -> Self {
    self.fresh = fresh;
    self.stale = stale;
    self
  }

  fn namespaced(&self, key: &str) -> String {
    format!("{}:{}", self.namespace, key)
  }

  /// Read a value, loading it through `load` per stale-while-revalidate
  /// rules.
  ///
  /// Background revalidation failures never reach a caller that was served
  /// a stale value; the stale entry stays in place until it expires.
  pub async fn swr<F, Fut>(&self, key: &str, load: F) -> Result<Value>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    let full_key = self.namespaced(key);
    let now = Utc::now();
    let cached = match self.store.get(&full_key).await {
      Ok(cached) => cached,
      Err(err) => {
        warn!(%err, key = %full_key, "store read failed, treating as miss");
        None
      }
    };

    match cached {
      Some(entry) if entry.is_fresh(now) => Ok(entry.data),
      Some(entry) if !entry.is_expired(now) => {
        let shared = self.shared_load(&full_key, load);
        tokio::spawn(async move {
          if let Err(err) = shared.await {
            debug!(%err, "background revalidation failed, stale entry left in place");
          }
        });
        Ok(entry.data)
      }
      _ => self
        .shared_load(&full_key, load)
        .await
        .map_err(Error::Load),
    }
  }

  /// The in-flight future for a key, creating it when none is outstanding.
  fn shared_load<F, Fut>(&self, full_key: &str, load: F) -> SharedLoad
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    let mut inflight = lock(&self.inflight);
    if let Some(existing) = inflight.get(full_key) {
      return existing.clone();
    }

    let store = Arc::clone(&self.store);
    let key = full_key.to_string();
    let fresh = self.fresh;
    let stale = self.stale;
    let inflight_map = Arc::clone(&self.inflight);

    let future = async move {
      let result = load().await.map_err(|e| e.to_string());
      if let Ok(value) = &result {
        if is_empty_result(value) {
          debug!(key = %key, "empty load result not written back");
        } else {
          let now = Utc::now();
          let entry = Entry {
            data: value.clone(),
            fresh_until: now + fresh,
            stale_until: now + stale,
          };
          if let Err(err) = store.set(&key, entry).await {
            warn!(%err, key = %key, "cache write-back failed");
          }
        }
      }
      lock(&inflight_map).remove(&key);
      result
    }
    .boxed()
    .shared();

    inflight.insert(full_key.to_string(), future.clone());
    future
  }

  /// Read the raw entry for a key, whatever its freshness.
  pub async fn get(&self, key: &str) -> Result<Option<Entry>> {
    self.store.get(&self.namespaced(key)).await
  }

  /// Write a value directly, starting fresh windows now.
  pub async fn set(&self, key: &str, data: Value) -> Result<()> {
    let now = Utc::now();
    self
      .store
      .set(
        &self.namespaced(key),
        Entry {
          data,
          fresh_until: now + self.fresh,
          stale_until: now + self.stale,
        },
      )
      .await
  }

  pub async fn remove(&self, key: &str) -> Result<()> {
    self.store.remove(&self.namespaced(key)).await
  }
}

impl<S: Store> Clone for SwrCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      namespace: self.namespace.clone(),
      fresh: self.fresh,
      stale: self.stale,
      inflight: Arc::clone(&self.inflight),
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
