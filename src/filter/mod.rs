//! Composable selection criteria.
//!
//! A [`Filter`] is a tree of [`ColumnFilter`] leaves joined by `And`, `Or` and
//! `Not`. The same tree is offered to a backend for push-down and evaluated in
//! memory for whatever the backend declined, so leaf evaluation mirrors SQL
//! semantics (`NULL` never matches, `LIKE` folds ASCII case).

mod column;
mod settings;

use chrono::Weekday;

pub use column::{ColumnFilter, ColumnPredicate};
pub use settings::FilterSettings;

use crate::{
    record::Model,
    value::{ToValue, Value},
};

/// Registry key for leaf push-down implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    OneOf,
    ListContains,
    Between,
    DayOfWeek,
    Literal,
    FullText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Column(ColumnFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn column(column: impl Into<String>, predicate: ColumnPredicate) -> Self {
        Filter::Column(ColumnFilter::new(column, predicate))
    }

    pub fn equals(column: &str, value: impl ToValue) -> Self {
        Self::column(column, ColumnPredicate::Equals(value.to_value()))
    }

    pub fn contains(column: &str, value: &str) -> Self {
        Self::column(column, ColumnPredicate::Contains(value.to_string()))
    }

    pub fn starts_with(column: &str, value: &str) -> Self {
        Self::column(column, ColumnPredicate::StartsWith(value.to_string()))
    }

    pub fn ends_with(column: &str, value: &str) -> Self {
        Self::column(column, ColumnPredicate::EndsWith(value.to_string()))
    }

    pub fn greater_than(column: &str, value: impl ToValue) -> Self {
        Self::column(
            column,
            ColumnPredicate::GreaterThan {
                value: value.to_value(),
                inclusive: false,
            },
        )
    }

    pub fn greater_than_or_equal(column: &str, value: impl ToValue) -> Self {
        Self::column(
            column,
            ColumnPredicate::GreaterThan {
                value: value.to_value(),
                inclusive: true,
            },
        )
    }

    pub fn less_than(column: &str, value: impl ToValue) -> Self {
        Self::column(
            column,
            ColumnPredicate::LessThan {
                value: value.to_value(),
                inclusive: false,
            },
        )
    }

    pub fn less_than_or_equal(column: &str, value: impl ToValue) -> Self {
        Self::column(
            column,
            ColumnPredicate::LessThan {
                value: value.to_value(),
                inclusive: true,
            },
        )
    }

    pub fn one_of<T: ToValue>(column: &str, values: Vec<T>) -> Self {
        Self::column(
            column,
            ColumnPredicate::OneOf(values.iter().map(ToValue::to_value).collect()),
        )
    }

    pub fn list_contains(column: &str, value: impl ToValue) -> Self {
        Self::column(column, ColumnPredicate::ListContains(value.to_value()))
    }

    pub fn between(column: &str, low: impl ToValue, high: impl ToValue) -> Self {
        Self::column(
            column,
            ColumnPredicate::Between(low.to_value(), high.to_value()),
        )
    }

    pub fn day_of_week(column: &str, days: Vec<Weekday>) -> Self {
        Self::column(column, ColumnPredicate::DayOfWeek(days))
    }

    pub fn literal(keep: bool) -> Self {
        Self::column(String::new(), ColumnPredicate::Literal(keep))
    }

    pub fn full_text(column: &str, query: &str) -> Self {
        Self::column(column, ColumnPredicate::FullText(query.to_string()))
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Wraps in `Not`. No predicate-specific inverse is ever attempted.
    pub fn inverted(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// AND-compose, flattening into an existing top-level `And`.
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            single => Filter::And(vec![single, other]),
        }
    }

    /// True when the record must be dropped.
    ///
    /// An empty `And` keeps everything, an empty `Or` drops everything.
    pub fn evaluate(&self, record: &dyn Model) -> bool {
        match self {
            Filter::Column(leaf) => leaf.excludes(record),
            Filter::And(children) => children.iter().any(|child| child.evaluate(record)),
            Filter::Or(children) => children.iter().all(|child| child.evaluate(record)),
            Filter::Not(child) => !child.evaluate(record),
        }
    }

    /// Like [`Filter::evaluate`] but skips conjunctive subtrees the backend already applied.
    pub fn evaluate_remaining(&self, record: &dyn Model) -> bool {
        if self.was_satisfied_by_backend() {
            return false;
        }
        match self {
            Filter::And(children) => children
                .iter()
                .any(|child| child.evaluate_remaining(record)),
            other => other.evaluate(record),
        }
    }

    /// Derived: leaves report the backend's verdict, `And`/`Or` require every
    /// child, `Not` follows its child. An empty `Or` is never satisfied.
    pub fn was_satisfied_by_backend(&self) -> bool {
        match self {
            Filter::Column(leaf) => leaf.was_satisfied_by_backend(),
            Filter::And(children) => children.iter().all(Filter::was_satisfied_by_backend),
            Filter::Or(children) => {
                !children.is_empty() && children.iter().all(Filter::was_satisfied_by_backend)
            }
            Filter::Not(child) => child.was_satisfied_by_backend(),
        }
    }

    pub fn reset_satisfaction(&mut self) {
        match self {
            Filter::Column(leaf) => leaf.reset(),
            Filter::And(children) | Filter::Or(children) => {
                children.iter_mut().for_each(Filter::reset_satisfaction)
            }
            Filter::Not(child) => child.reset_satisfaction(),
        }
    }

    pub fn leaves(&self) -> Vec<&ColumnFilter> {
        match self {
            Filter::Column(leaf) => vec![leaf],
            Filter::And(children) | Filter::Or(children) => {
                children.iter().flat_map(Filter::leaves).collect()
            }
            Filter::Not(child) => child.leaves(),
        }
    }

    /// Whether any leaf navigates a relationship.
    pub fn has_relationship_path(&self) -> bool {
        self.leaves()
            .iter()
            .any(|leaf| leaf.relationship_path().is_some())
    }
}

/// Equality shorthand: `filter!("Name", "Acme")`.
#[macro_export]
macro_rules! filter {
    ($column:expr, $value:expr) => {{
        use $crate::value::ToValue;
        $crate::filter::Filter::Column($crate::filter::ColumnFilter::new(
            $column,
            $crate::filter::ColumnPredicate::Equals($value.to_value()),
        ))
    }};
}

/// Matches records whose column is `NULL`.
pub fn is_null_filter(column: &str) -> Filter {
    Filter::column(column, ColumnPredicate::Equals(Value::Null))
}
