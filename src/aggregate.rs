use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{error::Error, record::Model, value::Value};

/// Registry key for aggregate push-down implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    CountDistinct,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateKind {
    fn alias_prefix(&self) -> &'static str {
        match self {
            AggregateKind::Count => "CountOf",
            AggregateKind::CountDistinct => "DistinctCountOf",
            AggregateKind::Sum => "SumOf",
            AggregateKind::Average => "AverageOf",
            AggregateKind::Min => "MinOf",
            AggregateKind::Max => "MaxOf",
        }
    }
}

/// A scalar or per-group aggregate over a (possibly dotted) column.
///
/// In-memory results follow SQL semantics: counting nothing yields `0`, every
/// other function over nothing yields `NULL`, a sum of integers stays an
/// integer (and fails once it leaves the `i64` range) and an average is
/// always a float.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    kind: AggregateKind,
    column: String,
    alias: String,
    calculated: bool,
    groups: HashMap<String, Accumulator>,
}

impl Aggregate {
    pub fn new(kind: AggregateKind, column: &str) -> Self {
        Self {
            kind,
            column: column.to_string(),
            alias: format!("{}{}", kind.alias_prefix(), column.replace('.', "")),
            calculated: false,
            groups: HashMap::new(),
        }
    }

    pub fn count(column: &str) -> Self {
        Self::new(AggregateKind::Count, column)
    }

    pub fn count_distinct(column: &str) -> Self {
        Self::new(AggregateKind::CountDistinct, column)
    }

    pub fn sum(column: &str) -> Self {
        Self::new(AggregateKind::Sum, column)
    }

    pub fn average(column: &str) -> Self {
        Self::new(AggregateKind::Average, column)
    }

    pub fn min(column: &str) -> Self {
        Self::new(AggregateKind::Min, column)
    }

    pub fn max(column: &str) -> Self {
        Self::new(AggregateKind::Max, column)
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// `("Contacts", "Balance")` for `Contacts.Balance`.
    pub fn relationship_path(&self) -> Option<(&str, &str)> {
        self.column.split_once('.')
    }

    pub fn was_calculated_by_backend(&self) -> bool {
        self.calculated
    }

    pub(crate) fn mark_calculated(&mut self) {
        self.calculated = true;
    }

    pub(crate) fn reset(&mut self) {
        self.calculated = false;
        self.groups.clear();
    }

    /// Feeds one record into the accumulator of `group_key`.
    pub fn calculate_by_iteration(&mut self, record: &dyn Model, group_key: &str) {
        let value = record.get(&self.column);
        self.accumulate(&value, group_key);
    }

    pub(crate) fn accumulate(&mut self, value: &Value, group_key: &str) {
        let accumulator = self.groups.entry(group_key.to_string()).or_default();
        if value.is_null() {
            return;
        }
        accumulator.count += 1;
        match self.kind {
            AggregateKind::Count => {}
            AggregateKind::CountDistinct => {
                accumulator.distinct.insert(distinct_key(value));
            }
            AggregateKind::Sum | AggregateKind::Average => accumulator.add(value),
            AggregateKind::Min => {
                if accumulator
                    .min
                    .as_ref()
                    .is_none_or(|current| value.sort_cmp(current).is_lt())
                {
                    accumulator.min = Some(value.clone());
                }
            }
            AggregateKind::Max => {
                if accumulator
                    .max
                    .as_ref()
                    .is_none_or(|current| value.sort_cmp(current).is_gt())
                {
                    accumulator.max = Some(value.clone());
                }
            }
        }
    }

    pub fn result(&self, group_key: &str) -> Result<Value, Error> {
        let Some(accumulator) = self.groups.get(group_key) else {
            return Ok(match self.kind {
                AggregateKind::Count | AggregateKind::CountDistinct => Value::Int(0),
                _ => Value::Null,
            });
        };
        Ok(match self.kind {
            AggregateKind::Count => Value::Int(accumulator.count),
            AggregateKind::CountDistinct => Value::Int(accumulator.distinct.len() as i64),
            AggregateKind::Sum if accumulator.count == 0 => Value::Null,
            AggregateKind::Sum if accumulator.real => Value::Float(accumulator.float_sum),
            AggregateKind::Sum => match accumulator.int_sum {
                Some(sum) => Value::Int(sum),
                None => {
                    return Err(Error::Overflow(format!(
                        "integer overflow in {}",
                        self.alias
                    )))
                }
            },
            AggregateKind::Average if accumulator.count == 0 => Value::Null,
            AggregateKind::Average => {
                Value::Float(accumulator.float_sum / accumulator.count as f64)
            }
            AggregateKind::Min => accumulator.min.clone().unwrap_or(Value::Null),
            AggregateKind::Max => accumulator.max.clone().unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Accumulator {
    count: i64,
    distinct: HashSet<String>,
    /// `None` once the integer sum overflowed.
    int_sum: Option<i64>,
    float_sum: f64,
    real: bool,
    min: Option<Value>,
    max: Option<Value>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            distinct: HashSet::new(),
            int_sum: Some(0),
            float_sum: 0.0,
            real: false,
            min: None,
            max: None,
        }
    }
}

impl Accumulator {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Int(_) | Value::Bool(_) => self.add_int(value.as_int().unwrap_or_default()),
            Value::Float(f) => {
                self.real = true;
                self.float_sum += f;
            }
            // Integer text sums as an integer, other text by its numeric prefix.
            Value::Text(text) => match text.trim().parse::<i64>() {
                Ok(i) => self.add_int(i),
                Err(_) => {
                    self.real = true;
                    self.float_sum += numeric_prefix(text);
                }
            },
            Value::List(_) | Value::Null => self.real = true,
        }
    }

    fn add_int(&mut self, i: i64) {
        self.int_sum = self.int_sum.and_then(|sum| sum.checked_add(i));
        self.float_sum += i as f64;
    }
}

/// Value of the longest leading number in `text`; `0.0` when there is none.
fn numeric_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let integral = digits(end);
    let mut mantissa = integral;
    if bytes.get(integral) == Some(&b'.') {
        mantissa = digits(integral + 1);
    }
    if mantissa == end || (mantissa == end + 1 && integral == end) {
        return 0.0;
    }
    end = mantissa;
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let after = digits(exponent);
        if after > exponent {
            end = after;
        }
    }
    text[..end].parse().unwrap_or_default()
}

fn distinct_key(value: &Value) -> String {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        Value::Bool(b) => (*b as i64).to_string(),
        Value::Text(s) => format!("t:{}", s),
        other => other.key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(aggregate: &mut Aggregate, values: &[Value]) {
        for value in values {
            aggregate.accumulate(value, "g");
        }
    }

    #[test]
    fn test_default_alias() {
        assert_eq!(Aggregate::sum("Balance").alias(), "SumOfBalance");
        assert_eq!(Aggregate::count("Contacts.ContactID").alias(), "CountOfContactsContactID");
        assert_eq!(Aggregate::max("Age").with_alias("Oldest").alias(), "Oldest");
    }

    #[test]
    fn test_sql_semantics_over_nothing() {
        let count = Aggregate::count("Balance");
        assert_eq!(count.result("g").unwrap(), Value::Int(0));

        let mut sum = Aggregate::sum("Balance");
        feed(&mut sum, &[Value::Null]);
        assert_eq!(sum.result("g").unwrap(), Value::Null);
        assert_eq!(Aggregate::average("Balance").result("g").unwrap(), Value::Null);
    }

    #[test]
    fn test_sum_keeps_integers() {
        let mut sum = Aggregate::sum("Balance");
        feed(&mut sum, &[Value::Int(10), Value::Null, Value::Int(20)]);
        assert_eq!(sum.result("g").unwrap(), Value::Int(30));

        feed(&mut sum, &[Value::Float(0.5)]);
        assert_eq!(sum.result("g").unwrap(), Value::Float(30.5));

        let mut average = Aggregate::average("Balance");
        feed(&mut average, &[Value::Int(1), Value::Int(2)]);
        assert_eq!(average.result("g").unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_integer_sum_overflow_fails() {
        let mut sum = Aggregate::sum("Balance");
        feed(&mut sum, &[Value::Int(i64::MAX), Value::Int(1)]);
        assert!(matches!(sum.result("g"), Err(Error::Overflow(_))));

        let mut average = Aggregate::average("Balance");
        feed(&mut average, &[Value::Int(i64::MAX), Value::Int(1)]);
        assert!(average.result("g").is_ok());

        feed(&mut sum, &[Value::Float(0.5)]);
        assert!(matches!(sum.result("g").unwrap(), Value::Float(_)));
    }

    #[test]
    fn test_text_sums_by_numeric_prefix() {
        let mut sum = Aggregate::sum("Balance");
        feed(&mut sum, &[Value::Text("12".into()), Value::Int(3)]);
        assert_eq!(sum.result("g").unwrap(), Value::Int(15));

        feed(&mut sum, &[Value::Text("12abc".into()), Value::Text("abc".into())]);
        assert_eq!(sum.result("g").unwrap(), Value::Float(27.0));

        assert_eq!(numeric_prefix(" -1.5e2x"), -150.0);
        assert_eq!(numeric_prefix(".5"), 0.5);
        assert_eq!(numeric_prefix("7e"), 7.0);
        assert_eq!(numeric_prefix("-."), 0.0);
    }

    #[test]
    fn test_min_max_and_distinct() {
        let values = [Value::Int(3), Value::Int(1), Value::Float(1.0), Value::Int(7)];
        let mut min = Aggregate::min("Age");
        let mut max = Aggregate::max("Age");
        let mut distinct = Aggregate::count_distinct("Age");
        feed(&mut min, &values);
        feed(&mut max, &values);
        feed(&mut distinct, &values);
        assert_eq!(min.result("g").unwrap(), Value::Int(1));
        assert_eq!(max.result("g").unwrap(), Value::Int(7));
        assert_eq!(distinct.result("g").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_groups_are_independent() {
        let mut count = Aggregate::count("ContactID");
        count.accumulate(&Value::Int(1), "a");
        count.accumulate(&Value::Int(2), "a");
        count.accumulate(&Value::Int(3), "b");
        assert_eq!(count.result("a").unwrap(), Value::Int(2));
        assert_eq!(count.result("b").unwrap(), Value::Int(1));
        count.reset();
        assert_eq!(count.result("a").unwrap(), Value::Int(0));
    }
}
