//! Negotiation between predicates and backends.
//!
//! Each leaf is offered to the backend's registered implementation for its
//! kind: `can_satisfy` is a pure capability check, `satisfy` emits the native
//! fragment. Combinators are translated here, generically, so every backend
//! gets the same AND / OR / NOT rules.

mod planner;
mod registry;
mod scope;

pub use planner::{NativeFlags, Output, Planner, Prepared, QueryPlan};
pub use registry::{BackendPushDown, PushDownRegistry};
pub use scope::Scope;

use crate::{
    aggregate::Aggregate,
    filter::{ColumnFilter, Filter},
    sql::{Operand, Params, SqlExpr, Stage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Memory,
    Sqlite,
}

/// Statement features beyond predicates a backend can take over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub joins: bool,
    pub sorting: bool,
    pub limits: bool,
    pub grouping: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            joins: true,
            sorting: true,
            limits: true,
            grouping: true,
        }
    }
}

pub trait FilterPushDown: Send + Sync {
    fn can_satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>) -> bool {
        scope.resolve(filter.column()).is_some()
    }

    /// `None` declines; the leaf then stays with the in-memory pass.
    fn satisfy(
        &self,
        filter: &ColumnFilter,
        scope: &Scope<'_>,
        params: &mut Params,
    ) -> Option<SqlExpr>;
}

pub trait AggregatePushDown: Send + Sync {
    fn can_calculate(&self, aggregate: &Aggregate, scope: &Scope<'_>) -> bool {
        matches!(scope.resolve(aggregate.column()), Some((_, Stage::Where)))
    }

    fn calculate(&self, aggregate: &Aggregate, scope: &Scope<'_>) -> Option<Operand>;
}

/// Translates as much of `filter` as the backend accepts and flags the
/// translated leaves. `And` may be pushed partially; `Or` and `Not` only
/// when everything beneath them was, otherwise their flags are cleared.
pub fn push_filter(
    filter: &mut Filter,
    push: &BackendPushDown,
    scope: &Scope<'_>,
    params: &mut Params,
) -> Option<SqlExpr> {
    match filter {
        Filter::Column(leaf) => {
            let implementation = push.filter(leaf.kind())?;
            if !implementation.can_satisfy(leaf, scope) {
                return None;
            }
            let expr = implementation.satisfy(leaf, scope, params)?;
            leaf.mark_satisfied();
            Some(expr)
        }
        Filter::And(children) => {
            let mut parts: Vec<SqlExpr> = children
                .iter_mut()
                .filter_map(|child| push_filter(child, push, scope, params))
                .collect();
            match parts.len() {
                0 if children.is_empty() => Some(SqlExpr::And(Vec::new())),
                0 => None,
                1 => parts.pop(),
                _ => Some(SqlExpr::And(parts)),
            }
        }
        Filter::Or(children) => {
            if children.is_empty() {
                return None;
            }
            let parts: Vec<Option<SqlExpr>> = children
                .iter_mut()
                .map(|child| push_filter(child, push, scope, params))
                .collect();
            let complete = children.iter().all(Filter::was_satisfied_by_backend);
            match parts.into_iter().collect::<Option<Vec<_>>>() {
                Some(parts) if complete => Some(SqlExpr::Or(parts)),
                _ => {
                    children.iter_mut().for_each(Filter::reset_satisfaction);
                    None
                }
            }
        }
        Filter::Not(child) => {
            let inner = push_filter(child, push, scope, params);
            match inner {
                Some(inner) if child.was_satisfied_by_backend() => {
                    Some(SqlExpr::Not(Box::new(inner)))
                }
                _ => {
                    child.reset_satisfaction();
                    None
                }
            }
        }
    }
}
