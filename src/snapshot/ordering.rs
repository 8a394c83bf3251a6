//! Sort order specifications and ordered insertion into cached
//! collections.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::record::{compare_values, resolve_path};

/// One key of a query's total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
  pub column: String,
  pub ascending: bool,
  pub nulls_first: bool,
  /// Order on an embedded resource's column.
  pub foreign_table: Option<String>,
}

impl OrderSpec {
  pub fn asc(column: &str) -> Self {
    OrderSpec {
      column: column.to_string(),
      ascending: true,
      nulls_first: false,
      foreign_table: None,
    }
  }

  pub fn desc(column: &str) -> Self {
    OrderSpec {
      column: column.to_string(),
      ascending: false,
      nulls_first: true,
      foreign_table: None,
    }
  }

  fn target_path(&self) -> String {
    match &self.foreign_table {
      Some(table) => format!("{}.{}", table, self.column),
      None => self.column.clone(),
    }
  }
}

/// Compare two records by the listed keys in priority order. Missing and
/// `null` values sort per `nulls_first`; ties fall through to the next key;
/// exhausting all keys yields `Equal` (a stable insertion slot, not
/// duplicate detection).
pub fn compare_records(a: &Value, b: &Value, specs: &[OrderSpec]) -> Ordering {
  for spec in specs {
    let path = spec.target_path();
    let left = resolve_path(a, &path);
    let right = resolve_path(b, &path);

    let left_null = left.as_ref().map_or(true, Value::is_null);
    let right_null = right.as_ref().map_or(true, Value::is_null);

    let ordering = match (left_null, right_null) {
      (true, true) => Ordering::Equal,
      (true, false) => {
        if spec.nulls_first {
          Ordering::Less
        } else {
          Ordering::Greater
        }
      }
      (false, true) => {
        if spec.nulls_first {
          Ordering::Greater
        } else {
          Ordering::Less
        }
      }
      (false, false) => {
        let raw = match (&left, &right) {
          (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
          _ => Ordering::Equal,
        };
        if spec.ascending {
          raw
        } else {
          raw.reverse()
        }
      }
    };

    if ordering != Ordering::Equal {
      return ordering;
    }
  }
  Ordering::Equal
}

/// Binary-search the insertion slot for `record` in a collection already
/// sorted by `specs`.
pub fn find_index_ordered(items: &[Value], record: &Value, specs: &[OrderSpec]) -> usize {
  items.partition_point(|existing| compare_records(existing, record, specs) != Ordering::Greater)
}

/// Parse an `order` query parameter: comma-separated
/// `[foreignTable.]column[.asc|.desc][.nullsfirst|.nullslast]` entries.
/// Defaults follow SQL: ascending, nulls last when ascending and first when
/// descending.
pub fn parse_order_param(value: &str) -> Vec<OrderSpec> {
  value
    .split(',')
    .filter_map(|token| {
      let token = token.trim();
      if token.is_empty() {
        return None;
      }
      let mut ascending = true;
      let mut nulls_first: Option<bool> = None;
      let mut segments: Vec<&str> = token.split('.').collect();
      while let Some(last) = segments.last() {
        match *last {
          "asc" => ascending = true,
          "desc" => ascending = false,
          "nullsfirst" => nulls_first = Some(true),
          "nullslast" => nulls_first = Some(false),
          _ => break,
        }
        segments.pop();
      }
      if segments.is_empty() {
        return None;
      }
      let (foreign_table, column) = if segments.len() >= 2 {
        (Some(segments[0].to_string()), segments[1..].join("."))
      } else {
        (None, segments[0].to_string())
      };
      Some(OrderSpec {
        column,
        ascending,
        nulls_first: nulls_first.unwrap_or(!ascending),
        foreign_table,
      })
    })
    .collect()
}
