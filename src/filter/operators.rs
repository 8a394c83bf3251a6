//! The filter operator vocabulary and its evaluation semantics.
//!
//! Operators are evaluated against `(column value, filter value)` pairs
//! where the column value was resolved from a record. Evaluation never
//! fails: a type mismatch (e.g. `cs` on a non-array column) makes the
//! condition false for that record.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

use super::FilterValue;
use crate::error::{Error, Result};
use crate::record::{json_eq, parse_iso_datetime};

/// The fixed operator set. Case-significant except where noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
  Eq,
  Neq,
  Gt,
  Gte,
  Lt,
  Lte,
  Like,
  Ilike,
  Is,
  In,
  /// Contains: the column array holds every filter element.
  Cs,
  /// Contained-by: every column element is among the filter elements.
  Cd,
  /// Full-text search against lexemes.
  Fts,
  /// Plain full-text search: additionally matches the whole query as a
  /// substring.
  Plfts,
}

impl Operator {
  pub fn from_token(token: &str) -> Option<Operator> {
    match token {
      "eq" => Some(Operator::Eq),
      "neq" => Some(Operator::Neq),
      "gt" => Some(Operator::Gt),
      "gte" => Some(Operator::Gte),
      "lt" => Some(Operator::Lt),
      "lte" => Some(Operator::Lte),
      "like" => Some(Operator::Like),
      "ilike" => Some(Operator::Ilike),
      "is" => Some(Operator::Is),
      "in" => Some(Operator::In),
      "cs" => Some(Operator::Cs),
      "cd" => Some(Operator::Cd),
      "fts" => Some(Operator::Fts),
      "plfts" => Some(Operator::Plfts),
      _ => None,
    }
  }

  /// Parse an operator token, failing with `UnsupportedOperator` for
  /// anything outside the vocabulary.
  pub fn parse(token: &str) -> Result<Operator> {
    Operator::from_token(token).ok_or_else(|| Error::UnsupportedOperator(token.to_string()))
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Operator::Eq => "eq",
      Operator::Neq => "neq",
      Operator::Gt => "gt",
      Operator::Gte => "gte",
      Operator::Lt => "lt",
      Operator::Lte => "lte",
      Operator::Like => "like",
      Operator::Ilike => "ilike",
      Operator::Is => "is",
      Operator::In => "in",
      Operator::Cs => "cs",
      Operator::Cd => "cd",
      Operator::Fts => "fts",
      Operator::Plfts => "plfts",
    }
  }
}

/// Apply an operator to a resolved column value and a filter value.
pub fn evaluate(operator: Operator, column: &Value, filter: &FilterValue) -> bool {
  match operator {
    Operator::Eq => eq(column, filter),
    Operator::Neq => !eq(column, filter),
    Operator::Gt => matches!(ord(column, filter), Some(Ordering::Greater)),
    Operator::Gte => matches!(ord(column, filter), Some(Ordering::Greater | Ordering::Equal)),
    Operator::Lt => matches!(ord(column, filter), Some(Ordering::Less)),
    Operator::Lte => matches!(ord(column, filter), Some(Ordering::Less | Ordering::Equal)),
    Operator::Like => like(column, filter, false),
    Operator::Ilike => like(column, filter, true),
    Operator::Is => is(column, filter),
    Operator::In => in_list(column, filter),
    Operator::Cs => contains(column, filter),
    Operator::Cd => contained_by(column, filter),
    Operator::Fts => fts(column, filter, false),
    Operator::Plfts => fts(column, filter, true),
  }
}

/// `eq`/`neq` compare by instant when the filter side is a datetime, by
/// loose JSON equality otherwise.
fn eq(column: &Value, filter: &FilterValue) -> bool {
  match filter {
    FilterValue::Timestamp(ts) => column
      .as_str()
      .and_then(parse_iso_datetime)
      .is_some_and(|c| c == *ts),
    FilterValue::Json(v) => json_eq(column, v),
  }
}

fn ord(column: &Value, filter: &FilterValue) -> Option<Ordering> {
  match filter {
    FilterValue::Timestamp(ts) => {
      let c = column.as_str().and_then(parse_iso_datetime)?;
      Some(c.cmp(ts))
    }
    FilterValue::Json(v) => crate::record::compare_values(column, v),
  }
}

fn is(column: &Value, filter: &FilterValue) -> bool {
  match filter {
    FilterValue::Json(v) => column == v,
    FilterValue::Timestamp(_) => false,
  }
}

fn like(column: &Value, filter: &FilterValue, case_insensitive: bool) -> bool {
  let (Some(text), Some(pattern)) = (column.as_str(), filter.as_str()) else {
    return false;
  };
  like_matches(text, pattern, case_insensitive)
}

/// `%` is a greedy wildcard; the pattern is anchored to the whole string.
pub(crate) fn like_matches(text: &str, pattern: &str, case_insensitive: bool) -> bool {
  let mut source = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
  let mut first = true;
  for part in pattern.split('%') {
    if !first {
      source.push_str(".*");
    }
    source.push_str(&regex::escape(part));
    first = false;
  }
  source.push('$');
  Regex::new(&source).map(|re| re.is_match(text)).unwrap_or(false)
}

/// `in` treats the filter value as a parenthesized comma list and tests
/// membership of the column value.
fn in_list(column: &Value, filter: &FilterValue) -> bool {
  match filter {
    FilterValue::Json(Value::Array(items)) => items.iter().any(|v| json_eq(column, v)),
    FilterValue::Json(Value::String(raw)) => {
      let Some(inner) = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
      else {
        return false;
      };
      split_list(inner)
        .into_iter()
        .any(|item| eq(column, &FilterValue::from_raw(unquote(item.trim()))))
    }
    _ => false,
  }
}

fn contains(column: &Value, filter: &FilterValue) -> bool {
  let Value::Array(items) = column else {
    return false;
  };
  let needles = filter_elements(filter);
  needles.iter().all(|n| items.iter().any(|i| json_eq(i, n)))
}

fn contained_by(column: &Value, filter: &FilterValue) -> bool {
  let Value::Array(items) = column else {
    return false;
  };
  let haystack = filter_elements(filter);
  items.iter().all(|i| haystack.iter().any(|h| json_eq(i, h)))
}

/// Elements of an array-shaped filter value: a JSON array, a `{a,b,c}`
/// array literal, or a single scalar treated as a one-element list.
fn filter_elements(filter: &FilterValue) -> Vec<Value> {
  match filter {
    FilterValue::Json(Value::Array(items)) => items.clone(),
    FilterValue::Json(Value::String(raw)) => {
      if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        split_list(inner)
          .into_iter()
          .filter(|s| !s.trim().is_empty())
          .map(|s| match FilterValue::from_raw(unquote(s.trim())) {
            FilterValue::Json(v) => v,
            FilterValue::Timestamp(_) => Value::String(s.trim().to_string()),
          })
          .collect()
      } else {
        vec![Value::String(raw.clone())]
      }
    }
    FilterValue::Json(v) => vec![v.clone()],
    FilterValue::Timestamp(_) => Vec::new(),
  }
}

/// Full-text search. Lexemes are taken from the column text (quoted
/// tsvector lexemes when present, whitespace tokens otherwise) and matched
/// against the query's terms, lower-cased; a `:*` suffix makes a term a
/// prefix match. Plain mode first tries the whole query as one substring.
fn fts(column: &Value, filter: &FilterValue, plain: bool) -> bool {
  let (Some(text), Some(query)) = (column.as_str(), filter.as_str()) else {
    return false;
  };

  if plain && like_matches(text, &format!("%{}%", query), true) {
    return true;
  }

  let mut alternatives = Vec::new();
  for term in query.split_whitespace() {
    let term = term.trim_matches('\'');
    if term.is_empty() || matches!(term, "&" | "|" | "!") {
      continue;
    }
    match term.strip_suffix(":*") {
      Some(prefix) => alternatives.push(format!("{}.*", regex::escape(&prefix.to_lowercase()))),
      None => alternatives.push(regex::escape(&term.to_lowercase())),
    }
  }
  if alternatives.is_empty() {
    return false;
  }
  let Ok(re) = Regex::new(&format!("^(?:{})$", alternatives.join("|"))) else {
    return false;
  };

  lexemes(text).iter().any(|lexeme| re.is_match(&lexeme.to_lowercase()))
}

/// Quoted lexemes out of a tsvector-shaped string, or plain whitespace
/// tokens when the text carries no quotes.
fn lexemes(text: &str) -> Vec<String> {
  if text.contains('\'') {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('\'') {
      let after = &rest[open + 1..];
      match after.find('\'') {
        Some(close) => {
          out.push(after[..close].to_string());
          rest = &after[close + 1..];
        }
        None => break,
      }
    }
    out
  } else {
    text.split_whitespace().map(str::to_string).collect()
  }
}

/// Split a comma list, honoring double-quoted entries.
fn split_list(s: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut in_quotes = false;
  let mut start = 0usize;
  for (i, c) in s.char_indices() {
    match c {
      '"' => in_quotes = !in_quotes,
      ',' if !in_quotes => {
        parts.push(&s[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  parts.push(&s[start..]);
  parts
}

fn unquote(s: &str) -> &str {
  s.strip_prefix('"')
    .and_then(|inner| inner.strip_suffix('"'))
    .unwrap_or(s)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn raw(s: &str) -> FilterValue {
    FilterValue::from_raw(s)
  }

  #[test]
  fn eq_compares_numbers_loosely() {
    assert!(evaluate(Operator::Eq, &json!(123), &raw("123")));
    assert!(evaluate(Operator::Eq, &json!(123.0), &raw("123")));
    assert!(!evaluate(Operator::Eq, &json!("123"), &raw("123")));
    assert!(evaluate(Operator::Neq, &json!(1), &raw("2")));
  }

  #[test]
  fn eq_compares_datetimes_by_instant() {
    assert!(evaluate(
      Operator::Eq,
      &json!("2023-01-01T01:00:00+01:00"),
      &raw("2023-01-01T00:00:00Z")
    ));
  }

  #[test]
  fn ordering_operators() {
    assert!(evaluate(Operator::Gt, &json!(10), &raw("2")));
    assert!(!evaluate(Operator::Gt, &json!(2), &raw("2")));
    assert!(evaluate(Operator::Gte, &json!(2), &raw("2")));
    assert!(evaluate(Operator::Lt, &json!("abc"), &raw("abd")));
    assert!(evaluate(
      Operator::Lte,
      &json!("2022-01-01T00:00:00Z"),
      &raw("2023-01-01T00:00:00Z")
    ));
    // mismatched types are unordered
    assert!(!evaluate(Operator::Gt, &json!("10"), &raw("2")));
  }

  #[test]
  fn like_anchors_whole_string() {
    assert!(evaluate(Operator::Like, &json!("hello world"), &raw("hello%")));
    assert!(evaluate(Operator::Like, &json!("hello world"), &raw("%world")));
    assert!(evaluate(Operator::Like, &json!("hello world"), &raw("%lo wo%")));
    assert!(!evaluate(Operator::Like, &json!("hello world"), &raw("world")));
    assert!(!evaluate(Operator::Like, &json!("Hello"), &raw("hello")));
    assert!(evaluate(Operator::Ilike, &json!("Hello"), &raw("hello")));
    assert!(evaluate(Operator::Ilike, &json!("a.b.c"), &raw("A.B%")));
  }

  #[test]
  fn is_checks_null_and_booleans_strictly() {
    assert!(evaluate(Operator::Is, &Value::Null, &raw("null")));
    assert!(evaluate(Operator::Is, &json!(true), &raw("true")));
    assert!(!evaluate(Operator::Is, &json!(1), &raw("true")));
  }

  #[test]
  fn in_list_membership() {
    assert!(evaluate(Operator::In, &json!(2), &raw("(1,2,3)")));
    assert!(evaluate(Operator::In, &json!("b"), &raw("(a,b)")));
    assert!(evaluate(Operator::In, &json!("a,b"), &raw("(\"a,b\",c)")));
    assert!(!evaluate(Operator::In, &json!(4), &raw("(1,2,3)")));
    assert!(!evaluate(Operator::In, &json!(1), &raw("1")));
  }

  #[test]
  fn contains_requires_array_column() {
    assert!(evaluate(Operator::Cs, &json!([1, 2, 3]), &raw("{1,2}")));
    assert!(!evaluate(Operator::Cs, &json!([1]), &raw("{1,2}")));
    // non-array column never contains anything
    assert!(!evaluate(Operator::Cs, &json!(456), &raw("456")));
    assert!(!evaluate(Operator::Cs, &json!("456"), &raw("456")));
  }

  #[test]
  fn contains_uses_deep_equality() {
    let column = json!([{"id": 1}, {"id": 2}]);
    assert!(evaluate(Operator::Cs, &column, &raw("[{\"id\": 1}]")));
    assert!(!evaluate(Operator::Cs, &column, &raw("[{\"id\": 3}]")));
  }

  #[test]
  fn contained_by_mirrors_contains() {
    assert!(evaluate(Operator::Cd, &json!([1, 2]), &raw("{1,2,3}")));
    assert!(!evaluate(Operator::Cd, &json!([1, 4]), &raw("{1,2,3}")));
    assert!(!evaluate(Operator::Cd, &json!(1), &raw("{1,2,3}")));
  }

  #[test]
  fn fts_matches_lexemes() {
    assert!(evaluate(
      Operator::Fts,
      &json!("'fat':2 'cat':3"),
      &raw("fat")
    ));
    assert!(evaluate(Operator::Fts, &json!("fat cats ate"), &raw("fat")));
    assert!(evaluate(Operator::Fts, &json!("fat cats"), &raw("ca:*")));
    assert!(!evaluate(Operator::Fts, &json!("fat cats"), &raw("dog")));
    assert!(evaluate(Operator::Fts, &json!("Fat Cats"), &raw("fat & cats")));
  }

  #[test]
  fn plain_fts_matches_substring() {
    // substring hit, but no single lexeme equals the term
    assert!(evaluate(
      Operator::Plfts,
      &json!("'supafast':1"),
      &raw("supa")
    ));
    assert!(!evaluate(Operator::Fts, &json!("'supafast':1"), &raw("supa")));
  }

  #[test]
  fn unknown_token_is_fatal() {
    assert_eq!(
      Operator::parse("eqq"),
      Err(crate::error::Error::UnsupportedOperator("eqq".to_string()))
    );
  }
}
