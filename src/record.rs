use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    schema::EntitySchema,
    value::{Affinity, Row, ToValue, Value},
};

/// The narrow accessor contract predicates, aggregates and cursors read records through.
pub trait Model: Send + Sync {
    fn entity(&self) -> &str;
    fn id_column(&self) -> &str;

    /// Missing columns read as `Value::Null`.
    fn get(&self, column: &str) -> Value;
    fn set(&mut self, column: &str, value: Value);

    fn export_raw(&self) -> Row;
    /// Overwrites same-named columns, keeps the rest.
    fn merge_raw(&mut self, data: Row);

    fn id(&self) -> Value {
        self.get(self.id_column())
    }

    /// How `column` compares against bounds of another storage class.
    fn affinity(&self, _column: &str) -> Affinity {
        Affinity::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    entity: String,
    id_column: String,
    data: Row,
    #[serde(skip)]
    affinities: Arc<HashMap<String, Affinity>>,
}

impl Record {
    pub fn new(schema: &EntitySchema) -> Self {
        let data = schema
            .columns
            .iter()
            .filter_map(|c| c.default.clone().map(|d| (c.name.clone(), d)))
            .collect();
        Self {
            entity: schema.entity.clone(),
            id_column: schema.id_column.clone(),
            data,
            affinities: schema.affinities(),
        }
    }

    pub fn from_row(schema: &EntitySchema, data: Row) -> Self {
        Self {
            entity: schema.entity.clone(),
            id_column: schema.id_column.clone(),
            data,
            affinities: schema.affinities(),
        }
    }

    pub fn with(mut self, column: &str, value: impl ToValue) -> Self {
        self.data.insert(column.to_string(), value.to_value());
        self
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn is_new(&self) -> bool {
        self.id().is_null()
    }
}

impl Model for Record {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn id_column(&self) -> &str {
        &self.id_column
    }

    fn get(&self, column: &str) -> Value {
        self.data.get(column).cloned().unwrap_or(Value::Null)
    }

    fn set(&mut self, column: &str, value: Value) {
        self.data.insert(column.to_string(), value);
    }

    fn export_raw(&self) -> Row {
        self.data.clone()
    }

    fn merge_raw(&mut self, data: Row) {
        self.data.extend(data);
    }

    fn affinity(&self, column: &str) -> Affinity {
        self.affinities.get(column).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_record_accessors() {
        let schema = EntitySchema::new("Company", "tblCompany")
            .id("CompanyID")
            .column_with_default("Active", ColumnType::Boolean, Value::Bool(true))
            .column("Name", ColumnType::Text);

        let mut record = Record::new(&schema).with("Name", "Acme");
        assert!(record.is_new());
        assert_eq!(record.get("Active"), Value::Bool(true));
        assert_eq!(record.get("Missing"), Value::Null);

        record.set("CompanyID", Value::Int(7));
        assert_eq!(record.id(), Value::Int(7));

        let mut extra = Row::new();
        extra.insert("Name".into(), Value::Text("Acme Ltd".into()));
        extra.insert("SumOfBalance".into(), Value::Int(30));
        record.merge_raw(extra);
        assert_eq!(record.get("Name"), Value::Text("Acme Ltd".into()));
        assert_eq!(record.get("SumOfBalance"), Value::Int(30));
        assert_eq!(record.get("Active"), Value::Bool(true));
    }
}
