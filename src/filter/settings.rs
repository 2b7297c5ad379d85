use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    filter::{ColumnFilter, ColumnPredicate, Filter},
    value::Value,
};

/// Persistable form of a predicate tree: kind tag plus constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FilterSettings {
    Equals {
        column: String,
        value: Value,
    },
    Contains {
        column: String,
        value: String,
    },
    StartsWith {
        column: String,
        value: String,
    },
    EndsWith {
        column: String,
        value: String,
    },
    GreaterThan {
        column: String,
        value: Value,
        #[serde(default)]
        inclusive: bool,
    },
    LessThan {
        column: String,
        value: Value,
        #[serde(default)]
        inclusive: bool,
    },
    OneOf {
        column: String,
        values: Vec<Value>,
    },
    ListContains {
        column: String,
        value: Value,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    DayOfWeek {
        column: String,
        /// Days counted from Sunday = 0.
        days: Vec<u32>,
    },
    Literal {
        keep: bool,
    },
    FullText {
        column: String,
        query: String,
    },
    And {
        filters: Vec<FilterSettings>,
    },
    Or {
        filters: Vec<FilterSettings>,
    },
    Not {
        filter: Box<FilterSettings>,
    },
}

impl Filter {
    /// Leaves whose column was rewritten by relationship expansion decline export.
    pub fn settings(&self) -> Result<FilterSettings, Error> {
        match self {
            Filter::And(children) => Ok(FilterSettings::And {
                filters: children.iter().map(Filter::settings).collect::<Result<_, _>>()?,
            }),
            Filter::Or(children) => Ok(FilterSettings::Or {
                filters: children.iter().map(Filter::settings).collect::<Result<_, _>>()?,
            }),
            Filter::Not(child) => Ok(FilterSettings::Not {
                filter: Box::new(child.settings()?),
            }),
            Filter::Column(leaf) => leaf_settings(leaf),
        }
    }

    pub fn from_settings(settings: FilterSettings) -> Result<Filter, Error> {
        let leaf = |column: String, predicate: ColumnPredicate| {
            Ok(Filter::Column(ColumnFilter::new(column, predicate)))
        };
        match settings {
            FilterSettings::Equals { column, value } => leaf(column, ColumnPredicate::Equals(value)),
            FilterSettings::Contains { column, value } => {
                leaf(column, ColumnPredicate::Contains(value))
            }
            FilterSettings::StartsWith { column, value } => {
                leaf(column, ColumnPredicate::StartsWith(value))
            }
            FilterSettings::EndsWith { column, value } => {
                leaf(column, ColumnPredicate::EndsWith(value))
            }
            FilterSettings::GreaterThan {
                column,
                value,
                inclusive,
            } => leaf(column, ColumnPredicate::GreaterThan { value, inclusive }),
            FilterSettings::LessThan {
                column,
                value,
                inclusive,
            } => leaf(column, ColumnPredicate::LessThan { value, inclusive }),
            FilterSettings::OneOf { column, values } => leaf(column, ColumnPredicate::OneOf(values)),
            FilterSettings::ListContains { column, value } => {
                leaf(column, ColumnPredicate::ListContains(value))
            }
            FilterSettings::Between { column, low, high } => {
                leaf(column, ColumnPredicate::Between(low, high))
            }
            FilterSettings::DayOfWeek { column, days } => {
                let days = days
                    .into_iter()
                    .map(|day| {
                        weekday_from_sunday(day).ok_or_else(|| {
                            Error::Deserialize(format!("invalid day of week: {}", day))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                leaf(column, ColumnPredicate::DayOfWeek(days))
            }
            FilterSettings::Literal { keep } => leaf(String::new(), ColumnPredicate::Literal(keep)),
            FilterSettings::FullText { column, query } => {
                leaf(column, ColumnPredicate::FullText(query))
            }
            FilterSettings::And { filters } => Ok(Filter::And(
                filters
                    .into_iter()
                    .map(Filter::from_settings)
                    .collect::<Result<_, _>>()?,
            )),
            FilterSettings::Or { filters } => Ok(Filter::Or(
                filters
                    .into_iter()
                    .map(Filter::from_settings)
                    .collect::<Result<_, _>>()?,
            )),
            FilterSettings::Not { filter } => {
                Ok(Filter::Not(Box::new(Filter::from_settings(*filter)?)))
            }
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(&self.settings()?).map_err(|e| Error::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Filter, Error> {
        let settings: FilterSettings =
            serde_json::from_str(json).map_err(|e| Error::Deserialize(e.to_string()))?;
        Filter::from_settings(settings)
    }
}

fn leaf_settings(leaf: &ColumnFilter) -> Result<FilterSettings, Error> {
    if leaf.is_rewritten() {
        return Err(Error::Unsupported(format!(
            "filter on '{}' was expanded across a relationship and cannot be exported",
            leaf.column()
        )));
    }
    let column = leaf.column().to_string();
    Ok(match leaf.predicate().clone() {
        ColumnPredicate::Equals(value) => FilterSettings::Equals { column, value },
        ColumnPredicate::Contains(value) => FilterSettings::Contains { column, value },
        ColumnPredicate::StartsWith(value) => FilterSettings::StartsWith { column, value },
        ColumnPredicate::EndsWith(value) => FilterSettings::EndsWith { column, value },
        ColumnPredicate::GreaterThan { value, inclusive } => FilterSettings::GreaterThan {
            column,
            value,
            inclusive,
        },
        ColumnPredicate::LessThan { value, inclusive } => FilterSettings::LessThan {
            column,
            value,
            inclusive,
        },
        ColumnPredicate::OneOf(values) => FilterSettings::OneOf { column, values },
        ColumnPredicate::ListContains(value) => FilterSettings::ListContains { column, value },
        ColumnPredicate::Between(low, high) => FilterSettings::Between { column, low, high },
        ColumnPredicate::DayOfWeek(days) => FilterSettings::DayOfWeek {
            column,
            days: days.iter().map(|d| d.num_days_from_sunday()).collect(),
        },
        ColumnPredicate::Literal(keep) => FilterSettings::Literal { keep },
        ColumnPredicate::FullText(query) => FilterSettings::FullText { column, query },
    })
}

pub(crate) fn weekday_from_sunday(day: u32) -> Option<Weekday> {
    match day {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}
