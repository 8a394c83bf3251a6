//! Parser for the compact selection syntax.
//!
//! The grammar is a comma-separated list of tokens, where a token is either
//! a bare field (`id`), an aliased field (`alias:field`), a JSON path
//! (`data->config->>theme`), or an embedded resource with a parenthesized
//! body (`relation!hint!inner(col,nested(sub))`). Wildcards are rejected:
//! a cached record must enumerate its fields so that cache membership of a
//! changed record can be decided without the server.

use super::{Path, RelationHint};
use crate::error::{Error, Result};

/// Parse a selection string into the list of selected paths.
///
/// Whitespace is insignificant. An empty selection yields an empty list.
/// Duplicate declarations are preserved; de-duplication is a caller
/// concern.
pub fn parse_selection(selection: &str) -> Result<Vec<Path>> {
  let stripped: String = selection.chars().filter(|c| !c.is_whitespace()).collect();
  if stripped.is_empty() {
    return Ok(Vec::new());
  }
  check_balanced(&stripped)?;

  let mut paths = Vec::new();
  parse_level(&stripped, &Prefix::default(), &mut paths)?;
  Ok(paths)
}

/// Accumulated state for one nesting level of embedded resources.
#[derive(Default, Clone)]
struct Prefix {
  path: Vec<String>,
  alias: Vec<String>,
  declaration: Vec<String>,
  aliased: bool,
  hints: Vec<RelationHint>,
  inner_joins: Vec<String>,
}

fn parse_level(body: &str, prefix: &Prefix, out: &mut Vec<Path>) -> Result<()> {
  for token in split_top_level(body, ',') {
    if token.is_empty() {
      continue;
    }

    match token.find('(') {
      Some(open) => {
        if !token.ends_with(')') {
          return Err(Error::UnsupportedSyntax(format!(
            "malformed embedded resource '{}'",
            token
          )));
        }
        let head = &token[..open];
        let inner = &token[open + 1..token.len() - 1];

        let (alias, rest) = split_alias(head);
        let mut markers = rest.split('!');
        let name = markers.next().unwrap_or("");
        if name.is_empty() {
          return Err(Error::UnsupportedSyntax(format!(
            "embedded resource without a name in '{}'",
            token
          )));
        }
        if name == "*" {
          return Err(Error::UnsupportedSyntax("wildcard selection '*'".to_string()));
        }

        let mut child = prefix.clone();
        child.path.push(name.to_string());
        child.alias.push(alias.unwrap_or(name).to_string());
        child.declaration.push(head.to_string());
        child.aliased |= alias.is_some();

        let relation_path = child.path.join(".");
        for marker in markers {
          if marker == "inner" {
            child.inner_joins.push(relation_path.clone());
          } else if !marker.is_empty() {
            child.hints.push(RelationHint {
              path: relation_path.clone(),
              hint: marker.to_string(),
            });
          }
        }

        parse_level(inner, &child, out)?;
      }
      None => {
        let (alias, name) = split_alias(token);
        if name == "*" {
          return Err(Error::UnsupportedSyntax("wildcard selection '*'".to_string()));
        }

        let mut path_segments = prefix.path.clone();
        path_segments.push(name.to_string());

        let mut declaration_segments = prefix.declaration.clone();
        declaration_segments.push(token.to_string());

        let aliased = prefix.aliased || alias.is_some();
        let alias_full = aliased.then(|| {
          let mut segments = prefix.alias.clone();
          segments.push(alias.unwrap_or(name).to_string());
          segments.join(".")
        });

        out.push(Path {
          path: path_segments.join("."),
          declaration: declaration_segments.join("."),
          alias: alias_full,
          hints: prefix.hints.clone(),
          inner_joins: prefix.inner_joins.clone(),
        });
      }
    }
  }
  Ok(())
}

/// Split an `alias:` prefix off a token. The colon only introduces an alias
/// when it appears before any JSON arrow or parenthesis.
fn split_alias(token: &str) -> (Option<&str>, &str) {
  match token.find(':') {
    Some(i) => {
      let before = &token[..i];
      if before.contains("->") || before.contains('(') {
        (None, token)
      } else {
        (Some(before), &token[i + 1..])
      }
    }
    None => (None, token),
  }
}

/// Split on `separator` at parenthesis depth zero.
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

fn check_balanced(s: &str) -> Result<()> {
  let mut depth = 0i64;
  for c in s.chars() {
    match c {
      '(' => depth += 1,
      ')' => depth -= 1,
      _ => {}
    }
    if depth < 0 {
      return Err(Error::UnsupportedSyntax(format!(
        "unbalanced parentheses in '{}'",
        s
      )));
    }
  }
  if depth != 0 {
    return Err(Error::UnsupportedSyntax(format!(
      "unbalanced parentheses in '{}'",
      s
    )));
  }
  Ok(())
}
