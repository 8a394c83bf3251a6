//! Error taxonomy for parsing, evaluation, and the store layer.

use thiserror::Error;

/// Errors surfaced by the crate.
///
/// Parse-time errors (`UnsupportedSyntax`, `UnsupportedOperator`) are fatal
/// and never retried. Evaluation never errors: a path that does not resolve
/// in a record makes the filter fail for that record instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// The selection or filter syntax cannot be represented: `*` wildcards,
  /// unbalanced parentheses, or an undecomposable filter condition.
  #[error("unsupported syntax: {0}")]
  UnsupportedSyntax(String),

  /// A filter referenced an operator outside the supported vocabulary.
  #[error("unsupported operator: {0}")]
  UnsupportedOperator(String),

  /// The changed record carries no value for a declared primary key.
  /// Callers check this before invoking the mutation engine.
  #[error("record has no value for primary key column '{0}'")]
  MissingPrimaryKeyValue(String),

  /// A store tier failed to read or write. Tier chains catch this per tier
  /// and treat the tier as a miss.
  #[error("store error: {0}")]
  Store(String),

  /// A loader invoked by the SWR cache failed and no cached value was
  /// available to serve instead.
  #[error("load failed: {0}")]
  Load(String),
}

pub type Result<T> = std::result::Result<T, Error>;
