//! Physical cache snapshot shapes and their recognition.
//!
//! Snapshots are created by the collaborator from a prior network response
//! and rewritten in place by the mutation engine; this crate never creates
//! or destroys them. Shapes are recognized by sniffing alone: presence of a
//! `data` field, a `hasMore` flag, or array-of-arrays nesting.

pub mod mutate;
pub mod ordering;

use serde_json::{Map, Value};

/// One page of a has-more paginated snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HasMorePage {
  pub data: Vec<Value>,
  pub has_more: bool,
}

/// The four physical cache representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
  /// A single-record result: `{data: record | null, count?}`.
  Single { data: Value, count: Option<u64> },
  /// A flat array result: `{data: [record...], count?}`.
  Collection { data: Vec<Value>, count: Option<u64> },
  /// Bare pages: `[[record...], ...]`, no metadata.
  Pages(Vec<Vec<Value>>),
  /// Pages with a has-more flag: `[{data: [...], hasMore}, ...]`.
  HasMorePages(Vec<HasMorePage>),
}

impl Snapshot {
  /// Classify a raw cache value. `None` means the shape is not one this
  /// engine owns; callers pass such values through unchanged.
  pub fn sniff(value: &Value) -> Option<Snapshot> {
    match value {
      Value::Object(map) if map.contains_key("data") => {
        let count = map.get("count").and_then(Value::as_u64);
        match map.get("data") {
          Some(Value::Array(items)) => Some(Snapshot::Collection {
            data: items.clone(),
            count,
          }),
          Some(data) => Some(Snapshot::Single {
            data: data.clone(),
            count,
          }),
          None => None,
        }
      }
      Value::Array(pages) => {
        if pages.iter().all(|p| is_has_more_page(p)) && !pages.is_empty() {
          let parsed = pages
            .iter()
            .filter_map(|p| {
              let map = p.as_object()?;
              Some(HasMorePage {
                data: map.get("data")?.as_array()?.clone(),
                has_more: map.get("hasMore")?.as_bool()?,
              })
            })
            .collect::<Vec<_>>();
          if parsed.len() == pages.len() {
            return Some(Snapshot::HasMorePages(parsed));
          }
          None
        } else if pages.iter().all(Value::is_array) {
          Some(Snapshot::Pages(
            pages
              .iter()
              .filter_map(|p| p.as_array().cloned())
              .collect(),
          ))
        } else {
          None
        }
      }
      _ => None,
    }
  }

  /// Serialize back into the raw cache representation.
  pub fn into_value(self) -> Value {
    match self {
      Snapshot::Single { data, count } => wrap_result(data, count),
      Snapshot::Collection { data, count } => wrap_result(Value::Array(data), count),
      Snapshot::Pages(pages) => {
        Value::Array(pages.into_iter().map(Value::Array).collect())
      }
      Snapshot::HasMorePages(pages) => Value::Array(
        pages
          .into_iter()
          .map(|page| {
            let mut map = Map::new();
            map.insert("data".to_string(), Value::Array(page.data));
            map.insert("hasMore".to_string(), Value::Bool(page.has_more));
            Value::Object(map)
          })
          .collect(),
      ),
    }
  }
}

fn is_has_more_page(value: &Value) -> bool {
  matches!(value, Value::Object(map) if map.contains_key("data") && map.contains_key("hasMore"))
}

fn wrap_result(data: Value, count: Option<u64>) -> Value {
  let mut map = Map::new();
  map.insert("data".to_string(), data);
  if let Some(count) = count {
    map.insert("count".to_string(), Value::from(count));
  }
  Value::Object(map)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn sniffs_single() {
    let snapshot = Snapshot::sniff(&json!({"data": {"id": 1}, "count": 1}));
    assert_eq!(
      snapshot,
      Some(Snapshot::Single {
        data: json!({"id": 1}),
        count: Some(1)
      })
    );
    assert_eq!(
      Snapshot::sniff(&json!({"data": null})),
      Some(Snapshot::Single {
        data: Value::Null,
        count: None
      })
    );
  }

  #[test]
  fn sniffs_collection() {
    let snapshot = Snapshot::sniff(&json!({"data": [{"id": 1}]}));
    assert_eq!(
      snapshot,
      Some(Snapshot::Collection {
        data: vec![json!({"id": 1})],
        count: None
      })
    );
  }

  #[test]
  fn sniffs_pages() {
    let snapshot = Snapshot::sniff(&json!([[{"id": 1}], [{"id": 2}]]));
    assert!(matches!(snapshot, Some(Snapshot::Pages(pages)) if pages.len() == 2));
  }

  #[test]
  fn sniffs_has_more_pages() {
    let snapshot = Snapshot::sniff(&json!([
      {"data": [{"id": 1}], "hasMore": true},
      {"data": [{"id": 2}], "hasMore": false}
    ]));
    let Some(Snapshot::HasMorePages(pages)) = snapshot else {
      panic!("expected has-more pages");
    };
    assert!(pages[0].has_more);
    assert!(!pages[1].has_more);
  }

  #[test]
  fn rejects_unknown_shapes() {
    assert_eq!(Snapshot::sniff(&json!(42)), None);
    assert_eq!(Snapshot::sniff(&json!({"rows": []})), None);
    assert_eq!(Snapshot::sniff(&json!([{"id": 1}])), None);
  }

  #[test]
  fn round_trips_through_value() {
    let raw = json!([
      {"data": [{"id": 1}], "hasMore": true},
      {"data": [], "hasMore": false}
    ]);
    let snapshot = Snapshot::sniff(&raw).unwrap();
    assert_eq!(snapshot.into_value(), raw);
  }

  #[test]
  fn count_is_kept_only_when_present() {
    let snapshot = Snapshot::Collection {
      data: vec![],
      count: None,
    };
    assert_eq!(snapshot.into_value(), json!({"data": []}));
  }
}
