//! Lazy collections over pluggable repositories.
//!
//! A [`Collection`] describes a result set (filter, sorts, range, joins and
//! per-record aggregates) without touching storage. When it is first read,
//! the planner translates whatever the repository's registered push-down
//! entries can express into one native statement and evaluates the rest in
//! memory, so a collection yields the same records on every backend.

pub mod aggregate;
pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod intersection;
pub mod pushdown;
pub mod record;
mod relationship;
pub mod repository;
pub mod schema;
pub mod sql;
pub mod value;

pub use crate::aggregate::{Aggregate, AggregateKind};
pub use crate::cache::ObjectCache;
pub use crate::collection::{Collection, Range, Sort, SortDirection};
pub use crate::config::{RepositoryConfig, SqliteConfig};
pub use crate::context::{Context, default_context, reset_default, set_default};
pub use crate::cursor::{Cursor, CursorState};
pub use crate::error::Error;
pub use crate::filter::{ColumnFilter, ColumnPredicate, Filter, FilterKind, FilterSettings, is_null_filter};
pub use crate::intersection::Intersection;
pub use crate::pushdown::{BackendKind, PushDownRegistry};
pub use crate::record::{Model, Record};
pub use crate::repository::{MemoryRepository, Repository};
#[cfg(feature = "sqlite")]
pub use crate::repository::SqliteRepository;
pub use crate::schema::{ColumnType, EntitySchema, SchemaRegistry};
pub use crate::value::{Affinity, Row, ToValue, Value};
