//! Evaluation of parsed filter trees and selections against records.
//!
//! A `Filter` is built once per `(filters, paths)` pair and is cheap to
//! share; callers memoize it keyed on the raw query string (see
//! `crate::query::ParseCache`).

use serde_json::{Map, Value};

use super::{operators, FilterLeaf, FilterNode};
use crate::record::{normalize_path, resolve_path};
use crate::select::Path;

/// Where `transform` places each selected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
  /// Place fields at their physical path.
  Physical,
  /// Place fields at their declared alias (physical path when unaliased).
  Aliased,
}

/// A compiled query: filter trees plus the selected paths, evaluable
/// against arbitrary records.
#[derive(Debug, Clone)]
pub struct Filter {
  filters: Vec<FilterNode>,
  paths: Vec<Path>,
}

impl Filter {
  pub fn new(filters: Vec<FilterNode>, paths: Vec<Path>) -> Self {
    Self { filters, paths }
  }

  pub fn filters(&self) -> &[FilterNode] {
    &self.filters
  }

  pub fn paths(&self) -> &[Path] {
    &self.paths
  }

  /// Does the record satisfy every top-level filter?
  ///
  /// A leaf whose path does not resolve in the record is false; evaluation
  /// never fails on malformed records.
  pub fn apply_filters(&self, record: &Value) -> bool {
    self.filters.iter().all(|node| eval_node(node, record))
  }

  /// Does the record carry every selected field?
  ///
  /// Fields resolve under their alias when one was declared. An array is
  /// accepted for a deeper path when at least one element satisfies it;
  /// empty arrays and explicit `null` count as present.
  pub fn has_paths(&self, record: &Value) -> bool {
    self
      .paths
      .iter()
      .all(|path| has_path(record, path.target()))
  }

  /// The composite cache-membership test: filters hold and all selected
  /// fields are present.
  pub fn apply(&self, record: &Value) -> bool {
    self.apply_filters(record) && self.has_paths(record)
  }

  /// Rebuild a record containing only the declared paths, placed per
  /// `mode`. Arrays are transformed element by element; fields absent in
  /// the source are omitted.
  pub fn transform(&self, record: &Value, mode: TransformMode) -> Value {
    let tree = ProjectionNode::build(&self.paths, mode);
    tree.project(record).unwrap_or(Value::Object(Map::new()))
  }
}

fn eval_node(node: &FilterNode, record: &Value) -> bool {
  match node {
    FilterNode::And(children) => children.iter().all(|c| eval_node(c, record)),
    FilterNode::Or(children) => children.iter().any(|c| eval_node(c, record)),
    FilterNode::Leaf(leaf) => eval_leaf(leaf, record),
  }
}

fn eval_leaf(leaf: &FilterLeaf, record: &Value) -> bool {
  let holds = match resolve_path(record, leaf.target()) {
    Some(resolved) => operators::evaluate(leaf.operator, &resolved, &leaf.value),
    None => return false,
  };
  holds != leaf.negate
}

fn has_path(record: &Value, path: &str) -> bool {
  let normalized = normalize_path(path);
  let segments: Vec<&str> = normalized.split('.').collect();
  has_segments(record, &segments)
}

fn has_segments(value: &Value, segments: &[&str]) -> bool {
  if segments.is_empty() {
    return true;
  }
  let Value::Object(map) = value else {
    return false;
  };
  match map.get(segments[0]) {
    None => false,
    // explicit null counts as present, whatever remains of the path
    Some(Value::Null) => true,
    Some(Value::Array(items)) => {
      if segments.len() == 1 || items.is_empty() {
        // an empty array is present for any nested path under it
        true
      } else {
        items.iter().any(|item| has_segments(item, &segments[1..]))
      }
    }
    Some(child) => has_segments(child, &segments[1..]),
  }
}

/// Tree of selected fields grouped by source segment, used by `transform`.
struct ProjectionNode {
  children: Vec<ProjectionChild>,
}

struct ProjectionChild {
  /// Physical segment name; source lookup tries this first.
  physical: String,
  /// Alias segment, used as a source fallback and as the destination name
  /// in aliased mode.
  alias: Option<String>,
  destination: String,
  leaf: bool,
  node: ProjectionNode,
}

impl ProjectionNode {
  fn build(paths: &[Path], mode: TransformMode) -> ProjectionNode {
    let mut root = ProjectionNode { children: Vec::new() };
    for path in paths {
      let levels = levels_of(path);
      root.insert(&levels, mode);
    }
    root
  }

  fn insert(&mut self, levels: &[Level], mode: TransformMode) {
    let Some((level, rest)) = levels.split_first() else {
      return;
    };
    let index = self
      .children
      .iter()
      .position(|c| c.physical == level.physical && c.alias == level.alias)
      .unwrap_or_else(|| {
        let destination = match mode {
          TransformMode::Physical => level.physical.clone(),
          TransformMode::Aliased => level.alias.clone().unwrap_or_else(|| level.physical.clone()),
        };
        self.children.push(ProjectionChild {
          physical: level.physical.clone(),
          alias: level.alias.clone(),
          destination,
          leaf: false,
          node: ProjectionNode { children: Vec::new() },
        });
        self.children.len() - 1
      });
    let child = &mut self.children[index];
    if rest.is_empty() {
      child.leaf = true;
    } else {
      child.node.insert(rest, mode);
    }
  }

  fn project(&self, source: &Value) -> Option<Value> {
    match source {
      Value::Array(items) => Some(Value::Array(
        items.iter().filter_map(|item| self.project(item)).collect(),
      )),
      Value::Object(map) => {
        let mut out = Map::new();
        for child in &self.children {
          let value = map
            .get(&child.physical)
            .or_else(|| child.alias.as_ref().and_then(|a| map.get(a)));
          let Some(value) = value else {
            continue;
          };
          if child.leaf {
            out.insert(child.destination.clone(), value.clone());
          } else if value.is_null() {
            out.insert(child.destination.clone(), Value::Null);
          } else if let Some(projected) = child.node.project(value) {
            out.insert(child.destination.clone(), projected);
          }
        }
        Some(Value::Object(out))
      }
      _ => None,
    }
  }
}

struct Level {
  physical: String,
  alias: Option<String>,
}

/// Split a path into per-level segments aligned with its alias chain. A
/// JSON arrow segment resolves under its last arrow component (the name the
/// server responds with when the selection is unaliased).
fn levels_of(path: &Path) -> Vec<Level> {
  let physical: Vec<&str> = path.path.split('.').collect();
  let aliases: Option<Vec<&str>> = path.alias.as_deref().map(|a| a.split('.').collect());

  physical
    .iter()
    .enumerate()
    .map(|(i, segment)| {
      let physical = match segment.rsplit_once("->") {
        Some((_, last)) => last.trim_start_matches('>').to_string(),
        None => segment.to_string(),
      };
      let alias = aliases
        .as_ref()
        .and_then(|chain| chain.get(i).copied())
        .filter(|a| *a != physical)
        .map(str::to_string);
      Level { physical, alias }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::{parse_filters, FilterParseOptions};
  use crate::select::parse_selection;
  use serde_json::json;

  fn build(selection: &str, query: &str) -> Filter {
    let paths = parse_selection(selection).unwrap();
    let filters = parse_filters(query, &paths, &FilterParseOptions::default()).unwrap();
    Filter::new(filters, paths)
  }

  #[test]
  fn applies_simple_filters() {
    let filter = build("id,name", "id.eq.1&name.like.a%");
    assert!(filter.apply_filters(&json!({"id": 1, "name": "abc"})));
    assert!(!filter.apply_filters(&json!({"id": 2, "name": "abc"})));
    assert!(!filter.apply_filters(&json!({"id": 1, "name": "xyz"})));
  }

  #[test]
  fn missing_path_fails_the_leaf() {
    let filter = build("id", "id.eq.1");
    assert!(!filter.apply_filters(&json!({"other": 1})));
    // negation of an unresolvable leaf is still false
    let filter = build("id", "id.not.eq.1");
    assert!(!filter.apply_filters(&json!({"other": 1})));
  }

  #[test]
  fn negate_inverts_the_operator() {
    let filter = build("id", "id.not.eq.1");
    assert!(filter.apply_filters(&json!({"id": 2})));
    assert!(!filter.apply_filters(&json!({"id": 1})));
  }

  #[test]
  fn and_or_nesting() {
    let filter = build("id,name,flag", "or=(id.eq.1,and(name.eq.a,flag.is.true))");
    assert!(filter.apply_filters(&json!({"id": 1, "name": "x", "flag": false})));
    assert!(filter.apply_filters(&json!({"id": 9, "name": "a", "flag": true})));
    assert!(!filter.apply_filters(&json!({"id": 9, "name": "a", "flag": false})));
  }

  #[test]
  fn cs_on_scalar_column_fails_apply() {
    // eq passes, but cs demands an array column
    let filter = build("id", "id.eq.123&id.cs.456");
    assert!(!filter.apply(&json!({"id": 123})));
  }

  #[test]
  fn filters_resolve_through_aliases() {
    let filter = build("test:some_column", "test.eq.5");
    // cached records live in the aliased (client) shape
    assert!(filter.apply_filters(&json!({"test": 5})));
    assert!(!filter.apply_filters(&json!({"test": 6})));
  }

  #[test]
  fn has_paths_checks_every_selected_field() {
    let filter = build("id,name,relation(value)", "");
    assert!(filter.has_paths(&json!({
      "id": 1, "name": "a", "relation": {"value": 2}
    })));
    assert!(!filter.has_paths(&json!({"id": 1, "name": "a"})));
    assert!(!filter.has_paths(&json!({
      "id": 1, "name": "a", "relation": {"other": 2}
    })));
  }

  #[test]
  fn has_paths_array_asymmetry() {
    let filter = build("relation(value)", "");
    // empty array: present for any nested path
    assert!(filter.has_paths(&json!({"relation": []})));
    // explicit null: present
    assert!(filter.has_paths(&json!({"relation": null})));
    // non-empty array: at least one element must satisfy the deeper path
    assert!(filter.has_paths(&json!({"relation": [{"value": 1}, {"x": 2}]})));
    assert!(!filter.has_paths(&json!({"relation": [{"x": 2}]})));
  }

  #[test]
  fn has_paths_uses_alias_when_declared() {
    let filter = build("test:some_column", "");
    assert!(filter.has_paths(&json!({"test": 1})));
    assert!(!filter.has_paths(&json!({"some_column": 1})));
  }

  #[test]
  fn transform_projects_selected_fields() {
    let filter = build("id,relation(value)", "");
    let record = json!({
      "id": 1,
      "extra": "drop me",
      "relation": {"value": 2, "noise": 3}
    });
    assert_eq!(
      filter.transform(&record, TransformMode::Physical),
      json!({"id": 1, "relation": {"value": 2}})
    );
  }

  #[test]
  fn transform_recurses_through_arrays() {
    let filter = build("id,items(sku)", "");
    let record = json!({
      "id": 1,
      "items": [{"sku": "a", "qty": 2}, {"sku": "b"}]
    });
    assert_eq!(
      filter.transform(&record, TransformMode::Physical),
      json!({"id": 1, "items": [{"sku": "a"}, {"sku": "b"}]})
    );
  }

  #[test]
  fn transform_omits_absent_fields() {
    let filter = build("id,name", "");
    assert_eq!(
      filter.transform(&json!({"id": 1}), TransformMode::Physical),
      json!({"id": 1})
    );
  }

  #[test]
  fn transform_renames_between_modes() {
    let filter = build("test:some_column", "");

    // physical-shaped source to aliased output
    assert_eq!(
      filter.transform(&json!({"some_column": 7}), TransformMode::Aliased),
      json!({"test": 7})
    );
    // aliased-shaped source back to physical output
    assert_eq!(
      filter.transform(&json!({"test": 7}), TransformMode::Physical),
      json!({"some_column": 7})
    );
  }

  #[test]
  fn transform_keeps_null_relations() {
    let filter = build("id,relation(value)", "");
    assert_eq!(
      filter.transform(&json!({"id": 1, "relation": null}), TransformMode::Physical),
      json!({"id": 1, "relation": null})
    );
  }
}
