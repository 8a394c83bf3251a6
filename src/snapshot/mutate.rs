//! Cache mutation engine: rewrite snapshots for local upserts, updates,
//! and deletes without a network round-trip.
//!
//! All entry points are pure over their inputs and perform no I/O. The
//! caller serializes mutations per cache key; there is no locking here.

use serde_json::Value;
use tracing::debug;

use super::ordering::{find_index_ordered, OrderSpec};
use super::{HasMorePage, Snapshot};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::record::{deep_merge, json_eq};

/// Default page size for re-chunking paginated snapshots when no limit was
/// supplied with the query.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// A pluggable merge strategy for upserts; defaults to deep merge.
pub type MergeFn = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// Configuration shared by the mutation entry points.
pub struct MutateOptions<'a> {
  /// Columns whose values identify a record. Equality on every one of them
  /// locates an existing record.
  pub primary_keys: &'a [&'a str],
  /// The query's compiled filter; decides continued cache membership.
  pub filter: &'a Filter,
  /// The query's total order. Empty means unordered (inserts prepend).
  pub order_by: &'a [OrderSpec],
  /// Page size for paginated shapes; the query's limit.
  pub page_size: Option<usize>,
  /// Merge strategy for upserts/updates.
  pub merge: Option<&'a MergeFn>,
}

impl<'a> MutateOptions<'a> {
  pub fn new(primary_keys: &'a [&'a str], filter: &'a Filter) -> Self {
    Self {
      primary_keys,
      filter,
      order_by: &[],
      page_size: None,
      merge: None,
    }
  }

  pub fn with_order_by(mut self, order_by: &'a [OrderSpec]) -> Self {
    self.order_by = order_by;
    self
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = Some(page_size);
    self
  }

  pub fn with_merge(mut self, merge: &'a MergeFn) -> Self {
    self.merge = Some(merge);
    self
  }

  fn effective_page_size(&self) -> usize {
    self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
  }

  fn merge_records(&self, existing: &Value, incoming: &Value) -> Value {
    match self.merge {
      Some(merge) => merge(existing, incoming),
      None => deep_merge(existing, incoming),
    }
  }
}

/// Check that a changed record carries a non-null value for every declared
/// primary key. Collaborators call this before invoking the engine.
pub fn validate_primary_keys(record: &Value, primary_keys: &[&str]) -> Result<()> {
  for key in primary_keys {
    let defined = record.get(*key).is_some_and(|v| !v.is_null());
    if !defined {
      return Err(Error::MissingPrimaryKeyValue((*key).to_string()));
    }
  }
  Ok(())
}

/// Insert or merge a changed record into a snapshot.
///
/// An existing record (primary-key equality) is merged and re-tested with
/// the filter: a passing merge keeps it (possibly at a new ordered
/// position), a failing merge removes it. A previously-absent record is
/// inserted when it carries all selected fields; a record that does not
/// would render incompletely and is never inserted.
pub fn upsert(snapshot: &Value, record: &Value, opts: &MutateOptions) -> Value {
  mutate(snapshot, record, opts, Op::Upsert)
}

/// Like `upsert`, but a previously-absent record is a silent no-op.
pub fn update(snapshot: &Value, record: &Value, opts: &MutateOptions) -> Value {
  mutate(snapshot, record, opts, Op::Update)
}

/// Remove every record matching the changed record's primary keys.
pub fn delete(snapshot: &Value, record: &Value, opts: &MutateOptions) -> Value {
  mutate(snapshot, record, opts, Op::Delete)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Upsert,
  Update,
  Delete,
}

fn mutate(snapshot: &Value, record: &Value, opts: &MutateOptions, op: Op) -> Value {
  let Some(shape) = Snapshot::sniff(snapshot) else {
    debug!(?op, "unrecognized snapshot shape, passing through");
    return snapshot.clone();
  };

  match shape {
    Snapshot::Single { data, count } => mutate_single(data, count, record, opts, op),
    Snapshot::Collection { data, count } => {
      let outcome = mutate_flat(data, record, opts, op);
      Snapshot::Collection {
        data: outcome.items,
        count: adjust_count(count, outcome.delta),
      }
      .into_value()
    }
    Snapshot::Pages(pages) => {
      let flat: Vec<Value> = pages.into_iter().flatten().collect();
      let outcome = mutate_flat(flat, record, opts, op);
      Snapshot::Pages(chunk(outcome.items, opts.effective_page_size())).into_value()
    }
    Snapshot::HasMorePages(pages) => {
      let last_has_more = pages.last().map_or(false, |p| p.has_more);
      let flat: Vec<Value> = pages.into_iter().flat_map(|p| p.data).collect();
      let outcome = mutate_flat(flat, record, opts, op);
      let chunks = chunk(outcome.items, opts.effective_page_size());
      let total = chunks.len();
      Snapshot::HasMorePages(
        chunks
          .into_iter()
          .enumerate()
          .map(|(i, data)| HasMorePage {
            data,
            has_more: i + 1 < total || last_has_more,
          })
          .collect(),
      )
      .into_value()
    }
  }
}

struct FlatOutcome {
  items: Vec<Value>,
  delta: i64,
}

fn mutate_flat(items: Vec<Value>, record: &Value, opts: &MutateOptions, op: Op) -> FlatOutcome {
  match op {
    Op::Delete => delete_flat(items, record, opts),
    Op::Upsert => upsert_flat(items, record, opts, true),
    Op::Update => upsert_flat(items, record, opts, false),
  }
}

fn upsert_flat(
  mut items: Vec<Value>,
  record: &Value,
  opts: &MutateOptions,
  insert_missing: bool,
) -> FlatOutcome {
  let existing = items
    .iter()
    .position(|item| matches_primary_keys(item, record, opts.primary_keys));

  match existing {
    Some(index) => {
      let merged = opts.merge_records(&items[index], record);
      items.remove(index);
      if opts.filter.apply(&merged) {
        let at = if opts.order_by.is_empty() {
          index
        } else {
          find_index_ordered(&items, &merged, opts.order_by)
        };
        debug!(index = at, "merged record kept in cache");
        items.insert(at, merged);
        FlatOutcome { items, delta: 0 }
      } else {
        debug!("merged record no longer matches, removed");
        FlatOutcome { items, delta: -1 }
      }
    }
    None if insert_missing && opts.filter.has_paths(record) => {
      let at = if opts.order_by.is_empty() {
        0
      } else {
        find_index_ordered(&items, record, opts.order_by)
      };
      debug!(index = at, "record inserted into cache");
      items.insert(at, record.clone());
      FlatOutcome { items, delta: 1 }
    }
    None => FlatOutcome { items, delta: 0 },
  }
}

fn delete_flat(mut items: Vec<Value>, record: &Value, opts: &MutateOptions) -> FlatOutcome {
  let before = items.len();
  items.retain(|item| !matches_primary_keys(item, record, opts.primary_keys));
  let removed = before - items.len();
  if removed > 0 {
    debug!(removed, "records deleted from cache");
  }
  FlatOutcome {
    items,
    delta: -(removed as i64),
  }
}

fn mutate_single(
  data: Value,
  count: Option<u64>,
  record: &Value,
  opts: &MutateOptions,
  op: Op,
) -> Value {
  let found = !data.is_null() && matches_primary_keys(&data, record, opts.primary_keys);
  if !found {
    // a single-record query never gains a record it did not have
    return Snapshot::Single { data, count }.into_value();
  }

  match op {
    Op::Delete => Snapshot::Single {
      data: Value::Null,
      count: adjust_count(count, -1),
    },
    Op::Upsert | Op::Update => {
      let merged = opts.merge_records(&data, record);
      if opts.filter.apply(&merged) {
        Snapshot::Single { data: merged, count }
      } else {
        Snapshot::Single {
          data: Value::Null,
          count: adjust_count(count, -1),
        }
      }
    }
  }
  .into_value()
}

fn matches_primary_keys(existing: &Value, record: &Value, primary_keys: &[&str]) -> bool {
  !primary_keys.is_empty()
    && primary_keys.iter().all(|key| {
      match (existing.get(*key), record.get(*key)) {
        (Some(a), Some(b)) => json_eq(a, b),
        _ => false,
      }
    })
}

fn adjust_count(count: Option<u64>, delta: i64) -> Option<u64> {
  count.map(|c| (c as i64 + delta).max(0) as u64)
}

/// Re-chunk a flat collection into fixed-size pages. An emptied collection
/// keeps one empty page so the snapshot's shape survives.
fn chunk(items: Vec<Value>, page_size: usize) -> Vec<Vec<Value>> {
  if items.is_empty() {
    return vec![Vec::new()];
  }
  items
    .chunks(page_size)
    .map(|chunk| chunk.to_vec())
    .collect()
}
