use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};

use crate::{
    filter::FilterKind,
    record::Model,
    value::{Affinity, Value},
};

/// Comparison carried by a leaf predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnPredicate {
    Equals(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    GreaterThan { value: Value, inclusive: bool },
    LessThan { value: Value, inclusive: bool },
    OneOf(Vec<Value>),
    /// The column holds a JSON array; matches when any element equals the value.
    ListContains(Value),
    /// Inclusive on both ends.
    Between(Value, Value),
    DayOfWeek(Vec<Weekday>),
    /// Constant predicate, `true` keeps every record. Ignores its column.
    Literal(bool),
    /// Every whitespace separated term must appear, case-insensitively.
    FullText(String),
}

impl ColumnPredicate {
    pub fn kind(&self) -> FilterKind {
        match self {
            ColumnPredicate::Equals(_) => FilterKind::Equals,
            ColumnPredicate::Contains(_) => FilterKind::Contains,
            ColumnPredicate::StartsWith(_) => FilterKind::StartsWith,
            ColumnPredicate::EndsWith(_) => FilterKind::EndsWith,
            ColumnPredicate::GreaterThan { .. } => FilterKind::GreaterThan,
            ColumnPredicate::LessThan { .. } => FilterKind::LessThan,
            ColumnPredicate::OneOf(_) => FilterKind::OneOf,
            ColumnPredicate::ListContains(_) => FilterKind::ListContains,
            ColumnPredicate::Between(_, _) => FilterKind::Between,
            ColumnPredicate::DayOfWeek(_) => FilterKind::DayOfWeek,
            ColumnPredicate::Literal(_) => FilterKind::Literal,
            ColumnPredicate::FullText(_) => FilterKind::FullText,
        }
    }
}

/// A leaf of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    column: String,
    predicate: ColumnPredicate,
    satisfied: bool,
    rewritten: bool,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, predicate: ColumnPredicate) -> Self {
        Self {
            column: column.into(),
            predicate,
            satisfied: false,
            rewritten: false,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn predicate(&self) -> &ColumnPredicate {
        &self.predicate
    }

    pub fn kind(&self) -> FilterKind {
        self.predicate.kind()
    }

    pub fn was_satisfied_by_backend(&self) -> bool {
        self.satisfied
    }

    pub fn is_rewritten(&self) -> bool {
        self.rewritten
    }

    pub(crate) fn mark_satisfied(&mut self) {
        self.satisfied = true;
    }

    pub(crate) fn reset(&mut self) {
        self.satisfied = false;
    }

    /// `("Contacts", "Name")` for `Contacts.Name`.
    pub fn relationship_path(&self) -> Option<(&str, &str)> {
        if matches!(self.predicate, ColumnPredicate::Literal(_)) {
            return None;
        }
        self.column.split_once('.')
    }

    /// Copy of this leaf targeting `column` on the far side of a relationship hop.
    pub(crate) fn rewritten_to(&self, column: &str) -> Self {
        Self {
            column: column.to_string(),
            predicate: self.predicate.clone(),
            satisfied: false,
            rewritten: true,
        }
    }

    /// True when the record must be dropped.
    pub fn excludes(&self, record: &dyn Model) -> bool {
        if let ColumnPredicate::Literal(keep) = &self.predicate {
            return !keep;
        }
        !self.matches(&record.get(&self.column), record.affinity(&self.column))
    }

    fn matches(&self, value: &Value, affinity: Affinity) -> bool {
        match &self.predicate {
            ColumnPredicate::Equals(Value::Null) => value.is_null(),
            ColumnPredicate::Equals(expected) => value.column_eq(expected, affinity) == Some(true),
            ColumnPredicate::Contains(needle) => {
                like(value, |text| text.contains(&needle.to_ascii_lowercase()))
            }
            ColumnPredicate::StartsWith(prefix) => {
                like(value, |text| text.starts_with(&prefix.to_ascii_lowercase()))
            }
            ColumnPredicate::EndsWith(suffix) => {
                like(value, |text| text.ends_with(&suffix.to_ascii_lowercase()))
            }
            ColumnPredicate::GreaterThan { value: bound, inclusive } => match value.column_cmp(bound, affinity) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => *inclusive,
                _ => false,
            },
            ColumnPredicate::LessThan { value: bound, inclusive } => match value.column_cmp(bound, affinity) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => *inclusive,
                _ => false,
            },
            ColumnPredicate::OneOf(candidates) => candidates
                .iter()
                .any(|candidate| value.column_eq(candidate, affinity) == Some(true)),
            ColumnPredicate::ListContains(needle) => list_items(value)
                .iter()
                .any(|item| strict_eq(item, needle)),
            ColumnPredicate::Between(low, high) => {
                matches!(
                    value.column_cmp(low, affinity),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(value.column_cmp(high, affinity), Some(Ordering::Less | Ordering::Equal))
            }
            ColumnPredicate::DayOfWeek(days) => {
                weekday_of(value).is_some_and(|day| days.contains(&day))
            }
            ColumnPredicate::Literal(keep) => *keep,
            ColumnPredicate::FullText(query) => match value.to_text() {
                Some(text) => {
                    let text = text.to_lowercase();
                    query
                        .split_whitespace()
                        .all(|term| text.contains(&term.to_lowercase()))
                }
                None => false,
            },
        }
    }
}

// LIKE folds ASCII case only.
fn like(value: &Value, test: impl Fn(&str) -> bool) -> bool {
    match value.to_text() {
        Some(text) => test(&text.to_ascii_lowercase()),
        None => false,
    }
}

fn list_items(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        Value::Text(json) => serde_json::from_str::<Vec<Value>>(json).unwrap_or_default(),
        _ => Vec::new(),
    }
}

// JSON elements carry no column affinity: text never equals a number.
fn strict_eq(item: &Value, needle: &Value) -> bool {
    match (item, needle) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Text(_), _) | (_, Value::Text(_)) => false,
        (a, b) => a.sql_eq(b) == Some(true),
    }
}

/// Weekday of a stored date; offsets are normalised to UTC first.
fn weekday_of(value: &Value) -> Option<Weekday> {
    let text = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.weekday());
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(text, format) {
            return Some(stamp.weekday());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|stamp| stamp.naive_utc().weekday())
}
