//! Native SQLite translations of leaf predicates.

use std::sync::Arc;

use crate::{
    filter::{ColumnFilter, ColumnPredicate, FilterKind},
    pushdown::{BackendKind, FilterPushDown, PushDownRegistry, Scope},
    sql::{CompareOp, Fragment, Operand, Params, SqlExpr},
    value::Value,
};

pub(super) fn register(registry: &mut PushDownRegistry) {
    let entries: [(FilterKind, Arc<dyn FilterPushDown>); 11] = [
        (FilterKind::Equals, Arc::new(Equals)),
        (FilterKind::Contains, Arc::new(Like)),
        (FilterKind::StartsWith, Arc::new(Like)),
        (FilterKind::EndsWith, Arc::new(Like)),
        (FilterKind::GreaterThan, Arc::new(Range)),
        (FilterKind::LessThan, Arc::new(Range)),
        (FilterKind::OneOf, Arc::new(OneOf)),
        (FilterKind::ListContains, Arc::new(ListContains)),
        (FilterKind::Between, Arc::new(Between)),
        (FilterKind::DayOfWeek, Arc::new(DayOfWeek)),
        (FilterKind::Literal, Arc::new(Literal)),
    ];
    for (kind, implementation) in entries {
        registry.register_filter(BackendKind::Sqlite, kind, implementation);
    }
}

struct Equals;

impl FilterPushDown for Equals {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        match filter.predicate() {
            ColumnPredicate::Equals(Value::Null) => Some(SqlExpr::literal(
                vec![Fragment::Operand(column), Fragment::sql(" IS NULL")],
                stage,
            )),
            ColumnPredicate::Equals(value) => {
                let name = params.add(filter.column(), value.clone());
                Some(SqlExpr::compare(column, CompareOp::Eq, Operand::Param(name), stage))
            }
            _ => None,
        }
    }
}

// `\` escapes the wildcards of the user's text.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct Like;

impl FilterPushDown for Like {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let pattern = match filter.predicate() {
            ColumnPredicate::Contains(text) => format!("%{}%", escape_like(text)),
            ColumnPredicate::StartsWith(text) => format!("{}%", escape_like(text)),
            ColumnPredicate::EndsWith(text) => format!("%{}", escape_like(text)),
            _ => return None,
        };
        let name = params.add(filter.column(), Value::Text(pattern));
        Some(SqlExpr::literal(
            vec![
                Fragment::Operand(column),
                Fragment::sql(" LIKE "),
                Fragment::Operand(Operand::Param(name)),
                Fragment::sql(" ESCAPE '\\'"),
            ],
            stage,
        ))
    }
}

struct Range;

impl FilterPushDown for Range {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let (op, value) = match filter.predicate() {
            ColumnPredicate::GreaterThan { value, inclusive } => {
                (if *inclusive { CompareOp::GtEq } else { CompareOp::Gt }, value)
            }
            ColumnPredicate::LessThan { value, inclusive } => {
                (if *inclusive { CompareOp::LtEq } else { CompareOp::Lt }, value)
            }
            _ => return None,
        };
        let name = params.add(filter.column(), value.clone());
        Some(SqlExpr::compare(column, op, Operand::Param(name), stage))
    }
}

struct OneOf;

impl FilterPushDown for OneOf {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let ColumnPredicate::OneOf(values) = filter.predicate() else {
            return None;
        };
        if values.is_empty() {
            return Some(SqlExpr::literal(vec![Fragment::sql("0")], stage));
        }
        let items = values
            .iter()
            .map(|value| Operand::Param(params.add(filter.column(), value.clone())))
            .collect();
        Some(SqlExpr::compare(column, CompareOp::In, Operand::List(items), stage))
    }
}

struct ListContains;

impl FilterPushDown for ListContains {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let ColumnPredicate::ListContains(value) = filter.predicate() else {
            return None;
        };
        let name = params.add(filter.column(), value.clone());
        // json_each fails on malformed documents; CASE keeps it from running on them.
        Some(SqlExpr::literal(
            vec![
                Fragment::sql("CASE WHEN json_valid("),
                Fragment::Operand(column.clone()),
                Fragment::sql(") THEN EXISTS (SELECT 1 FROM json_each("),
                Fragment::Operand(column),
                Fragment::sql(") WHERE json_each.value = "),
                Fragment::Operand(Operand::Param(name)),
                Fragment::sql(") ELSE 0 END"),
            ],
            stage,
        ))
    }
}

struct Between;

impl FilterPushDown for Between {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let ColumnPredicate::Between(low, high) = filter.predicate() else {
            return None;
        };
        let low = params.add(filter.column(), low.clone());
        let high = params.add(filter.column(), high.clone());
        Some(SqlExpr::literal(
            vec![
                Fragment::Operand(column),
                Fragment::sql(" BETWEEN "),
                Fragment::Operand(Operand::Param(low)),
                Fragment::sql(" AND "),
                Fragment::Operand(Operand::Param(high)),
            ],
            stage,
        ))
    }
}

struct DayOfWeek;

impl FilterPushDown for DayOfWeek {
    fn satisfy(&self, filter: &ColumnFilter, scope: &Scope<'_>, _params: &mut Params) -> Option<SqlExpr> {
        let (column, stage) = scope.resolve(filter.column())?;
        let ColumnPredicate::DayOfWeek(days) = filter.predicate() else {
            return None;
        };
        if days.is_empty() {
            return Some(SqlExpr::literal(vec![Fragment::sql("0")], stage));
        }
        let days: Vec<String> = days
            .iter()
            .map(|day| day.num_days_from_sunday().to_string())
            .collect();
        Some(SqlExpr::literal(
            vec![
                Fragment::sql("CAST(strftime('%w', "),
                Fragment::Operand(column),
                Fragment::sql(format!(") AS INTEGER) IN ({})", days.join(", "))),
            ],
            stage,
        ))
    }
}

struct Literal;

impl FilterPushDown for Literal {
    fn can_satisfy(&self, _filter: &ColumnFilter, _scope: &Scope<'_>) -> bool {
        true
    }

    fn satisfy(&self, filter: &ColumnFilter, _scope: &Scope<'_>, _params: &mut Params) -> Option<SqlExpr> {
        match filter.predicate() {
            ColumnPredicate::Literal(keep) => Some(SqlExpr::literal(
                vec![Fragment::sql(if *keep { "1" } else { "0" })],
                crate::sql::Stage::Where,
            )),
            _ => None,
        }
    }
}
