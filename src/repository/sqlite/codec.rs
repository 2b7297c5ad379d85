use sqlx::{
    Column as _, Row as _, Sqlite, TypeInfo, ValueRef,
    query::Query as SqlxQuery,
    sqlite::{SqliteArguments, SqliteRow},
};

use crate::{
    error::Error,
    schema::{Column, ColumnType},
    value::{Row, Value},
};

pub(super) fn bind_values<'q>(
    mut query: SqlxQuery<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [Value],
) -> SqlxQuery<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            // Lists are stored as JSON documents.
            Value::List(_) => query.bind(value.to_text().unwrap_or_else(|| "[]".to_string())),
        };
    }
    query
}

/// Decodes by the storage class of the value itself, so computed columns
/// (aggregates, joined columns) decode the same way as table columns.
pub(super) fn decode(row: &SqliteRow, index: usize) -> Result<Value, Error> {
    let de = |e: sqlx::Error| Error::Deserialize(e.to_string());
    let raw = row.try_get_raw(index).map_err(de)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();
    match storage.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            row.try_get_unchecked::<i64, _>(index).map(Value::Int).map_err(de)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get_unchecked::<f64, _>(index).map(Value::Float).map_err(de)
        }
        "BLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index).map_err(de)?;
            Ok(Value::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => row.try_get_unchecked::<String, _>(index).map(Value::Text).map_err(de),
    }
}

/// Every column of the row, keyed by its name.
pub(super) fn decode_row(row: &SqliteRow) -> Result<Row, Error> {
    row.columns()
        .iter()
        .map(|column| Ok((column.name().to_string(), decode(row, column.ordinal())?)))
        .collect()
}

pub(super) fn column_definition(column: &Column, quoted_name: String) -> String {
    let declared = match column.column_type {
        ColumnType::AutoIncrement => "INTEGER PRIMARY KEY AUTOINCREMENT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text | ColumnType::Json => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Date => "DATE",
        ColumnType::DateTime => "DATETIME",
    };
    format!("{} {}", quoted_name, declared)
}
