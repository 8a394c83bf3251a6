//! Filter trees parsed from query strings, and their evaluation against
//! records.

mod eval;
mod operators;
mod parser;

pub use eval::{Filter, TransformMode};
pub use operators::Operator;
pub use parser::{parse_filters, FilterParseOptions};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::record::parse_iso_datetime;

/// A parsed predicate: a leaf condition or an AND/OR group. Groups nest to
/// unbounded depth.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
  And(Vec<FilterNode>),
  Or(Vec<FilterNode>),
  Leaf(FilterLeaf),
}

/// One leaf condition: `path.operator.value`, optionally negated.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterLeaf {
  /// Physical column path (filters referencing a declared alias are
  /// substituted back to the physical path at parse time).
  pub path: String,
  /// The declared alias, when the selection aliased this path.
  pub alias: Option<String>,
  pub operator: Operator,
  pub negate: bool,
  pub value: FilterValue,
}

impl FilterLeaf {
  /// The name this condition resolves under in a cached record.
  pub fn target(&self) -> &str {
    self.alias.as_deref().unwrap_or(&self.path)
  }
}

/// A filter's right-hand value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
  /// The raw text parsed as an ISO-8601 datetime.
  Timestamp(DateTime<FixedOffset>),
  /// Anything else: JSON if the raw text parses as JSON, else the text
  /// itself as a string.
  Json(Value),
}

impl FilterValue {
  /// Resolve raw filter text: ISO-8601 datetime detection first, then JSON
  /// parsing, else the text stays a string.
  pub fn from_raw(raw: &str) -> Self {
    if let Some(ts) = parse_iso_datetime(raw) {
      return FilterValue::Timestamp(ts);
    }
    match serde_json::from_str::<Value>(raw) {
      Ok(value) => FilterValue::Json(value),
      Err(_) => FilterValue::Json(Value::String(raw.to_string())),
    }
  }

  /// The value as a plain string, when it is one.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      FilterValue::Json(Value::String(s)) => Some(s),
      _ => None,
    }
  }
}
