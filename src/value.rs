use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw column data of a single record, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Type affinity of the column a value is read from. Decides how a stored
/// value compares against a bound of another storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    /// Numeric bounds are rendered as text and compared byte-wise.
    Text,
    /// Well-formed numeric text is converted to a number.
    Numeric,
    /// Computed columns: operands compare by storage class alone.
    #[default]
    None,
}

/// A dynamically typed column value.
///
/// Comparison helpers follow SQLite semantics so that a predicate evaluated in
/// memory agrees with the same predicate evaluated by the relational backend:
/// `NULL` never compares equal to anything, integers and floats compare
/// numerically, and text compares byte-wise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Text rendering used by pattern matching (`LIKE` converts operands to text).
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::Text(s) => Some(s.clone()),
            Value::List(items) => serde_json::to_string(items).ok(),
        }
    }

    /// Stable identity key for a record identifier.
    pub fn key(&self) -> String {
        self.to_text().unwrap_or_default()
    }

    /// `self = other` under SQL rules; `None` when either side is `NULL`.
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        self.sql_cmp(other).map(|ord| ord == Ordering::Equal)
    }

    /// Ordering under SQL comparison rules; `None` when either side is `NULL`.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_float()?.partial_cmp(&b.as_float()?)
            }
            (Value::Text(a), Value::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            // Column affinity converts well-formed numeric text before comparing.
            (Value::Text(text), number) if number.is_numeric() => match text.trim().parse::<f64>() {
                Ok(parsed) => parsed.partial_cmp(&number.as_float()?),
                Err(_) => Some(Ordering::Greater),
            },
            (number, Value::Text(text)) if number.is_numeric() => match text.trim().parse::<f64>() {
                Ok(parsed) => number.as_float()?.partial_cmp(&parsed),
                Err(_) => Some(Ordering::Less),
            },
            (a, b) => Some(a.sort_cmp(b)),
        }
    }

    /// Comparison of a stored column value against a bound, applying the
    /// column's affinity to the bound first.
    pub fn column_cmp(&self, bound: &Value, affinity: Affinity) -> Option<Ordering> {
        if self.is_null() || bound.is_null() {
            return None;
        }
        match affinity {
            Affinity::Numeric => self.sql_cmp(bound),
            Affinity::Text if self.is_numeric() || bound.is_numeric() => {
                let (stored, bound) = (self.to_text()?, bound.to_text()?);
                Some(stored.as_bytes().cmp(bound.as_bytes()))
            }
            Affinity::Text | Affinity::None => Some(self.sort_cmp(bound)),
        }
    }

    pub fn column_eq(&self, bound: &Value, affinity: Affinity) -> Option<bool> {
        self.column_cmp(bound, affinity).map(|ord| ord == Ordering::Equal)
    }

    /// Total order used for sorting: `NULL` < numbers < text < lists.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| match v {
            Value::Null => 0,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::List(_) => 3,
        };
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => a
                .as_float()
                .unwrap_or_default()
                .partial_cmp(&b.as_float().unwrap_or_default())
                .unwrap_or(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.to_text().unwrap_or_default()),
        }
    }
}

// Helper trait to convert types to Value
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for u32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for chrono::NaiveDate {
    fn to_value(&self) -> Value {
        Value::Text(self.format("%Y-%m-%d").to_string())
    }
}

impl ToValue for chrono::NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Text(self.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}
