//! Expression and statement builder for relational backends.
//!
//! Nothing here parses SQL. Predicates and aggregates emit [`SqlExpr`] and
//! [`Operand`] nodes, the planner assembles them into a [`Statement`], and a
//! [`Dialect`] decides quoting and placeholder syntax at render time.

mod dialect;
mod expr;
mod params;
mod statement;

pub use dialect::{Dialect, SqliteDialect};
pub use expr::{ColumnRef, CompareOp, Fragment, Operand, SqlExpr, Stage};
pub use params::{Params, Renderer};
pub use statement::{Join, JoinKind, SelectColumn, Statement};
