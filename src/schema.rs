use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::Error,
    value::{Affinity, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    AutoIncrement,
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    DateTime,
    /// A JSON document; list columns used with `ListContains` are stored this way.
    Json,
}

impl ColumnType {
    /// Declared `TEXT` and `JSON` columns keep text; every other declared type
    /// resolves to an integer, real or numeric affinity.
    pub fn affinity(&self) -> Affinity {
        match self {
            ColumnType::Text | ColumnType::Json => Affinity::Text,
            _ => Affinity::Numeric,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Hops that can never multiply the outer row.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }
}

/// Link entity of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Through {
    pub entity: String,
    /// Link column matching the source key.
    pub source_column: String,
    /// Link column matching the target key.
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub name: String,
    pub target: String,
    pub source_column: String,
    pub target_column: String,
    pub cardinality: Cardinality,
    pub through: Option<Through>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub entity: String,
    pub table: String,
    pub id_column: String,
    pub columns: Vec<Column>,
    pub relationships: Vec<Relationship>,
    affinities: Arc<HashMap<String, Affinity>>,
}

impl EntitySchema {
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            id_column: "id".to_string(),
            columns: Vec::new(),
            relationships: Vec::new(),
            affinities: Arc::default(),
        }
    }

    // Shared with every record built from this schema.
    fn index_affinities(mut self) -> Self {
        self.affinities = Arc::new(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.column_type.affinity()))
                .collect(),
        );
        self
    }

    /// Declare the auto-increment identifier column.
    pub fn id(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.columns.retain(|c| c.name != name);
        self.columns.insert(
            0,
            Column {
                name: name.clone(),
                column_type: ColumnType::AutoIncrement,
                default: None,
            },
        );
        self.id_column = name;
        self.index_affinities()
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
            default: None,
        });
        self.index_affinities()
    }

    pub fn column_with_default(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        default: Value,
    ) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
            default: Some(default),
        });
        self.index_affinities()
    }

    fn relationship_of(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.relationships.push(Relationship {
            name: name.into(),
            target: target.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
            cardinality,
            through: None,
        });
        self
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.relationship_of(name, target, source_column, target_column, Cardinality::OneToOne)
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.relationship_of(name, target, source_column, target_column, Cardinality::ManyToOne)
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.relationship_of(name, target, source_column, target_column, Cardinality::OneToMany)
    }

    /// Many-to-many through a link entity: `source_column` on this entity matches
    /// `through.source_column`, `through.target_column` matches `target_column`
    /// on the target entity.
    pub fn has_many_through(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        source_column: impl Into<String>,
        through: Through,
        target_column: impl Into<String>,
    ) -> Self {
        self.relationships.push(Relationship {
            name: name.into(),
            target: target.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
            cardinality: Cardinality::ManyToMany,
            through: Some(through),
        });
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_def(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Affinity of a declared column; computed columns have none.
    pub fn affinity(&self, name: &str) -> Affinity {
        self.affinities.get(name).copied().unwrap_or_default()
    }

    pub(crate) fn affinities(&self) -> Arc<HashMap<String, Affinity>> {
        Arc::clone(&self.affinities)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Entity name → schema lookup consumed by collections, planners and repositories.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EntitySchema) -> &mut Self {
        self.entities
            .insert(schema.entity.clone(), Arc::new(schema));
        self
    }

    pub fn with(mut self, schema: EntitySchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, entity: &str) -> Result<Arc<EntitySchema>, Error> {
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| Error::Schema(format!("entity '{}' is not registered", entity)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.entities.values()
    }
}
