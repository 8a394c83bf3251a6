//! Parsed-query facade, stable cache keys, and an explicit parse cache.
//!
//! Parsing is deterministic and cheap to memoize keyed on the raw query
//! strings. The memo is an explicit object owned by the caller rather than
//! a process-wide cache, so hosts control its lifetime and eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::filter::{parse_filters, Filter, FilterParseOptions};
use crate::select::parse_selection;
use crate::snapshot::ordering::{parse_order_param, OrderSpec};

/// A fully parsed query: compiled filter (selection paths + predicate
/// trees) and ordering.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
  pub filter: Filter,
  pub order_by: Vec<OrderSpec>,
}

impl ParsedQuery {
  /// Parse a selection string and a filter query string into evaluable
  /// trees. The `order` parameter of the query string, when present,
  /// supplies the ordering.
  pub fn parse(selection: &str, query: &str, opts: &FilterParseOptions) -> Result<Self> {
    let paths = parse_selection(selection)?;
    let filters = parse_filters(query, &paths, opts)?;
    let order_by = query
      .split('&')
      .filter_map(|pair| pair.split_once('='))
      .filter(|(key, _)| *key == "order")
      .flat_map(|(_, value)| parse_order_param(value))
      .collect();
    Ok(Self {
      filter: Filter::new(filters, paths),
      order_by,
    })
  }
}

/// Stable identity of a cached query: its raw selection and filter strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  pub selection: String,
  pub query: String,
}

impl QueryKey {
  pub fn new(selection: &str, query: &str) -> Self {
    Self {
      selection: selection.to_string(),
      query: query.to_string(),
    }
  }

  /// SHA-256 hash for stable, fixed-length keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.selection.as_bytes());
    hasher.update(b"|");
    hasher.update(self.query.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable description for logs and debugging.
  pub fn description(&self) -> String {
    if self.query.is_empty() {
      format!("select {}", self.selection)
    } else {
      format!("select {} where {}", self.selection, self.query)
    }
  }
}

/// Bounded memo of parsed queries keyed by raw strings plus parse options.
/// Evicts oldest-inserted entries once full; parsed values are shared via
/// `Arc` so eviction never invalidates a live reference.
pub struct ParseCache {
  capacity: usize,
  entries: HashMap<String, Arc<ParsedQuery>>,
  insertion_order: VecDeque<String>,
}

impl ParseCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      entries: HashMap::new(),
      insertion_order: VecDeque::new(),
    }
  }

  /// Parse through the cache. A hit returns the shared parse; a miss
  /// parses, stores, and may evict the oldest entry.
  pub fn parse(
    &mut self,
    selection: &str,
    query: &str,
    opts: &FilterParseOptions,
  ) -> Result<Arc<ParsedQuery>> {
    let key = fingerprint(selection, query, opts);
    if let Some(hit) = self.entries.get(&key) {
      return Ok(Arc::clone(hit));
    }

    let parsed = Arc::new(ParsedQuery::parse(selection, query, opts)?);
    while self.entries.len() >= self.capacity {
      match self.insertion_order.pop_front() {
        Some(oldest) => {
          self.entries.remove(&oldest);
        }
        None => break,
      }
    }
    self.insertion_order.push_back(key.clone());
    self.entries.insert(key, Arc::clone(&parsed));
    Ok(parsed)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.insertion_order.clear();
  }
}

fn fingerprint(selection: &str, query: &str, opts: &FilterParseOptions) -> String {
  let exclusive = opts
    .exclusive_paths
    .as_ref()
    .map(|paths| paths.join(","))
    .unwrap_or_default();
  format!("{}|{}|{}", selection, query, exclusive)
}
