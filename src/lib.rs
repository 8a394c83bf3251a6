//! qcache keeps a client-side result cache for a REST query layer
//! consistent with local mutations, without a network round-trip.
//!
//! The core is a synchronous triad:
//!
//! - [`select`] parses a compact selection syntax (nested columns,
//!   aliases, join hints) into [`select::Path`] trees.
//! - [`filter`] parses query-string predicates into AND/OR trees and
//!   evaluates them against arbitrary JSON records: does a changed record
//!   still belong in a cached result set?
//! - [`snapshot`] rewrites the physical cache representations (single
//!   record, flat array, paginated pages, has-more pages) in place,
//!   preserving sort order, page sizes, and counts.
//!
//! [`swr`] adds a loosely-coupled stale-while-revalidate tiered store
//! serving the same goal: avoid refetching.
//!
//! Hosts supply the raw query strings, the snapshot to mutate, and the
//! primary-key columns; transport, retries, and re-rendering stay on their
//! side of the boundary.
//!
//! # Example
//!
//! ```
//! use qcache::{FilterParseOptions, MutateOptions, ParsedQuery};
//! use serde_json::json;
//!
//! let parsed = ParsedQuery::parse(
//!   "id,name",
//!   "name.like.a%&order=name.asc",
//!   &FilterParseOptions::default(),
//! )?;
//!
//! // a locally inserted record enters the cached collection in order
//! let snapshot = json!({"data": [{"id": 1, "name": "abc"}], "count": 1});
//! let record = json!({"id": 2, "name": "aaa"});
//! assert!(parsed.filter.apply(&record));
//!
//! let opts = MutateOptions::new(&["id"], &parsed.filter).with_order_by(&parsed.order_by);
//! let mutated = qcache::upsert(&snapshot, &record, &opts);
//! assert_eq!(mutated["data"][0]["id"], json!(2));
//! assert_eq!(mutated["count"], json!(2));
//! # Ok::<(), qcache::Error>(())
//! ```

mod error;

pub mod filter;
pub mod query;
pub mod record;
pub mod select;
pub mod snapshot;
pub mod swr;

pub use error::{Error, Result};
pub use filter::{
  parse_filters, Filter, FilterLeaf, FilterNode, FilterParseOptions, FilterValue, Operator,
  TransformMode,
};
pub use query::{ParseCache, ParsedQuery, QueryKey};
pub use select::{parse_selection, Path, RelationHint};
pub use snapshot::mutate::{
  delete, update, upsert, validate_primary_keys, MergeFn, MutateOptions, DEFAULT_PAGE_SIZE,
};
pub use snapshot::ordering::{parse_order_param, OrderSpec};
pub use snapshot::{HasMorePage, Snapshot};
pub use swr::{MemoryStore, SqliteStore, Store, SwrCache, TieredStore};
