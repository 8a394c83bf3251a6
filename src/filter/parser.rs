//! Parser for URL-query-string-shaped filter input.
//!
//! Each `key=value` pair whose key or value carries a recognized operator
//! token is a filter; everything else (selection, ordering, pagination,
//! api keys) is consumed elsewhere and ignored here. The combined string
//! `key.value` is decomposed recursively: `and(...)`/`or(...)` groups wrap
//! comma-split bodies, a leaf is split right-to-left at the last
//! dot-segment naming a known operator.

use super::operators::Operator;
use super::{FilterLeaf, FilterNode, FilterValue};
use crate::error::{Error, Result};
use crate::select::Path;

/// Options for filter parsing.
#[derive(Debug, Clone, Default)]
pub struct FilterParseOptions {
  /// When set, leaves whose resolved path is not in this list are silently
  /// dropped, and groups that become empty are dropped with them.
  pub exclusive_paths: Option<Vec<String>>,
}

/// Parse a filter query string against the selected paths of the query.
///
/// Output order is the insertion order of the raw query-string entries; all
/// top-level entries are implicitly ANDed, so the order carries no
/// semantics, but it is deterministic for cache-key derivation.
pub fn parse_filters(
  query: &str,
  paths: &[Path],
  opts: &FilterParseOptions,
) -> Result<Vec<FilterNode>> {
  let mut out = Vec::new();
  for pair in query.split('&') {
    let pair = pair.trim();
    if pair.is_empty() {
      continue;
    }
    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
    if !is_filter_pair(key, value) {
      continue;
    }
    let combined = if value.is_empty() {
      key.to_string()
    } else {
      format!("{}.{}", key, value)
    };
    if let Some(node) = parse_expr(&combined, "", paths, opts)? {
      out.push(node);
    }
  }
  Ok(out)
}

/// A pair is a filter candidate when its key is structural (`and`, `or`,
/// `table.or`) or its value contains a recognized operator token.
fn is_filter_pair(key: &str, value: &str) -> bool {
  if key == "and" || key == "or" || key.ends_with(".or") || key.ends_with(".and") {
    return true;
  }
  value
    .split('.')
    .chain(key.split('.'))
    .any(|segment| Operator::from_token(strip_operator_config(segment)).is_some())
}

/// `fts(english)`-style language configs ride on the operator segment and
/// are ignored for matching purposes.
fn strip_operator_config(segment: &str) -> &str {
  match segment.find('(') {
    Some(i) if segment.ends_with(')') => &segment[..i],
    _ => segment,
  }
}

fn parse_expr(
  s: &str,
  table_prefix: &str,
  paths: &[Path],
  opts: &FilterParseOptions,
) -> Result<Option<FilterNode>> {
  let s = s.trim();

  if let Some((keyword, prefix, body)) = structural_group(s) {
    let full_prefix = join_prefix(table_prefix, prefix);
    let mut children = Vec::new();
    for part in split_top_level(body, ',') {
      let part = part.trim();
      if part.is_empty() {
        continue;
      }
      if let Some(child) = parse_expr(part, &full_prefix, paths, opts)? {
        children.push(child);
      }
    }
    if children.is_empty() {
      return Ok(None);
    }
    return Ok(Some(match keyword {
      Keyword::And => FilterNode::And(children),
      Keyword::Or => FilterNode::Or(children),
    }));
  }

  parse_leaf(s, table_prefix, paths, opts)
}

#[derive(Clone, Copy)]
enum Keyword {
  And,
  Or,
}

/// Recognize `and(...)`, `and.(...)`, `[table.]or(...)`, `[table.]or.(...)`.
/// Returns the keyword, the foreign-table prefix, and the group body.
fn structural_group(s: &str) -> Option<(Keyword, &str, &str)> {
  let open = s.find('(')?;
  if !s.ends_with(')') {
    return None;
  }
  let head = s[..open].trim_end_matches('.');
  let body = &s[open + 1..s.len() - 1];

  if head == "and" {
    return Some((Keyword::And, "", body));
  }
  if head == "or" {
    return Some((Keyword::Or, "", body));
  }
  if let Some(prefix) = head.strip_suffix(".or") {
    return Some((Keyword::Or, prefix, body));
  }
  None
}

fn join_prefix(outer: &str, inner: &str) -> String {
  match (outer.is_empty(), inner.is_empty()) {
    (true, true) => String::new(),
    (true, false) => inner.to_string(),
    (false, true) => outer.to_string(),
    (false, false) => format!("{}.{}", outer, inner),
  }
}

fn parse_leaf(
  s: &str,
  table_prefix: &str,
  paths: &[Path],
  opts: &FilterParseOptions,
) -> Result<Option<FilterNode>> {
  let segments: Vec<&str> = s.split('.').collect();
  if segments.len() < 2 {
    return Err(Error::UnsupportedSyntax(format!(
      "cannot decompose filter condition '{}'",
      s
    )));
  }

  // rightmost segment naming a known operator, with at least one value
  // segment after it
  let operator_index = (0..segments.len() - 1)
    .rev()
    .find(|&i| Operator::from_token(strip_operator_config(segments[i])).is_some());
  let Some(i) = operator_index else {
    // the presumed operator position is the second-to-last segment
    return Err(Error::UnsupportedOperator(
      segments[segments.len() - 2].to_string(),
    ));
  };

  let operator = Operator::parse(strip_operator_config(segments[i]))?;
  let (negate, path_end) = if i > 0 && segments[i - 1] == "not" {
    (true, i - 1)
  } else {
    (false, i)
  };
  if path_end == 0 {
    return Err(Error::UnsupportedSyntax(format!(
      "filter condition without a path: '{}'",
      s
    )));
  }

  let raw_path = join_prefix(table_prefix, &segments[..path_end].join("."));
  let raw_value = segments[i + 1..].join(".");

  let (path, alias) = resolve_alias(raw_path, paths);
  if let Some(exclusive) = &opts.exclusive_paths {
    if !exclusive.iter().any(|p| p == &path) {
      return Ok(None);
    }
  }

  Ok(Some(FilterNode::Leaf(FilterLeaf {
    path,
    alias,
    operator,
    negate,
    value: FilterValue::from_raw(&raw_value),
  })))
}

/// Filters may reference either the physical path or the declared alias;
/// substitute the counterpart from the parsed selection.
fn resolve_alias(resolved: String, paths: &[Path]) -> (String, Option<String>) {
  for path in paths {
    if path.path == resolved {
      return (resolved, path.alias.clone());
    }
  }
  for path in paths {
    if path.alias.as_deref() == Some(resolved.as_str()) {
      return (path.path.clone(), Some(resolved));
    }
  }
  (resolved, None)
}

/// Split on `separator` at parenthesis depth zero, so adjacent `and(...)`
/// groups inside an `or` body stay together.
fn split_top_level(s: &str, separator: char) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = 0usize;
  for (i, c) in s.char_indices() {
    match c {
      '(' => depth += 1,
      ')' => depth = depth.saturating_sub(1),
      c if c == separator && depth == 0 => {
        parts.push(&s[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  parts.push(&s[start..]);
  parts
}
