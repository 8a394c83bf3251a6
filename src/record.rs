//! Helpers for working with untyped JSON records: path resolution,
//! comparison, and merging.
//!
//! Records are `serde_json::Value` objects of unknown shape. A missing key
//! is "undefined"; an explicit JSON `null` is a defined value. Everything
//! here is pure and never fails on malformed records.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;

/// Fold JSON arrows (`->`, `->>`) into dots so a column path can be
/// resolved against a decoded record.
pub fn normalize_path(path: &str) -> String {
  path.replace("->>", ".").replace("->", ".")
}

/// Resolve a dot-separated path against a record.
///
/// Objects are traversed field-by-field. An array mid-path maps the rest of
/// the path across its elements, dropping elements where the path is
/// undefined; if no element resolves, the whole path is undefined.
pub fn resolve_path(record: &Value, path: &str) -> Option<Value> {
  let normalized = normalize_path(path);
  let segments: Vec<&str> = normalized.split('.').collect();
  resolve_segments(record, &segments)
}

fn resolve_segments(value: &Value, segments: &[&str]) -> Option<Value> {
  if segments.is_empty() {
    return Some(value.clone());
  }
  match value {
    Value::Object(map) => map
      .get(segments[0])
      .and_then(|child| resolve_segments(child, &segments[1..])),
    Value::Array(items) => {
      let resolved: Vec<Value> = items
        .iter()
        .filter_map(|item| resolve_segments(item, segments))
        .collect();
      if resolved.is_empty() {
        None
      } else {
        Some(Value::Array(resolved))
      }
    }
    _ => None,
  }
}

/// Parse an ISO-8601 datetime with offset (RFC 3339). Date-only strings and
/// space-separated timestamps are not datetimes here.
pub fn parse_iso_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(s).ok()
}

/// Equality across JSON values with numbers compared numerically, so that
/// `123` and `123.0` are the same value.
pub fn json_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
    _ => a == b,
  }
}

/// Raw ordering across JSON scalars: numbers numerically, strings lexically
/// (by instant when both parse as ISO datetimes), booleans `false < true`.
/// Mismatched or non-scalar types are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => {
      if let (Some(dx), Some(dy)) = (parse_iso_datetime(x), parse_iso_datetime(y)) {
        Some(dx.cmp(&dy))
      } else {
        Some(x.cmp(y))
      }
    }
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    _ => None,
  }
}

/// Deep-merge `incoming` into `base`: nested objects merge key-by-key,
/// everything else (arrays included) is replaced by the incoming value.
pub fn deep_merge(base: &Value, incoming: &Value) -> Value {
  match (base, incoming) {
    (Value::Object(b), Value::Object(i)) => {
      let mut out = b.clone();
      for (key, value) in i {
        let merged = match b.get(key) {
          Some(existing) => deep_merge(existing, value),
          None => value.clone(),
        };
        out.insert(key.clone(), merged);
      }
      Value::Object(out)
    }
    _ => incoming.clone(),
  }
}
