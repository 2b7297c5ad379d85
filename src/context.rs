use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::{
    collection::Collection,
    error::Error,
    record::{Model, Record},
    repository::Repository,
    schema::{EntitySchema, SchemaRegistry},
    value::{ToValue, Value},
};

/// Entry point: the schemas and the repository every collection is built
/// against. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Hyle>,
}

pub struct Hyle {
    schemas: SchemaRegistry,
    repository: Arc<dyn Repository>,
}

impl Context {
    pub fn new(schemas: SchemaRegistry, repository: impl Repository + 'static) -> Self {
        Self::with_repository(schemas, Arc::new(repository))
    }

    pub fn with_repository(schemas: SchemaRegistry, repository: Arc<dyn Repository>) -> Self {
        Self {
            inner: Arc::new(Hyle {
                schemas,
                repository,
            }),
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.inner.repository
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn schema(&self, entity: &str) -> Result<Arc<EntitySchema>, Error> {
        self.inner.schemas.get(entity)
    }

    /// Every record of `entity`, lazily.
    pub fn collection(&self, entity: &str) -> Collection {
        Collection::new(self.clone(), entity)
    }

    /// A new, unsaved record with the schema's column defaults.
    pub fn record(&self, entity: &str) -> Result<Record, Error> {
        let schema = self.schema(entity)?;
        Ok(Record::new(&schema))
    }

    // ==================== Record persistence ====================

    /// Fetch a record by identifier, from the object cache when possible.
    pub async fn load(&self, entity: &str, id: impl ToValue) -> Result<Record, Error> {
        let schema = self.schema(entity)?;
        let id = id.to_value();
        let repository = &self.inner.repository;
        if let Some(row) = repository.cache().get(entity, &id) {
            return Ok(Record::from_row(&schema, row));
        }
        let row = repository
            .load_rows(&schema, std::slice::from_ref(&id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(entity, &id))?;
        repository.cache().put(entity, &id, row.clone());
        Ok(Record::from_row(&schema, row))
    }

    /// Insert or update; a new record receives its identifier.
    pub async fn save(&self, record: &mut Record) -> Result<(), Error> {
        let schema = self.schema(record.entity())?;
        self.inner.repository.save(&schema, record).await
    }

    pub async fn delete(&self, entity: &str, id: impl ToValue) -> Result<bool, Error> {
        let schema = self.schema(entity)?;
        let id: Value = id.to_value();
        self.inner.repository.delete(&schema, &id).await
    }

    /// Creates the table of every registered entity.
    pub async fn create_tables(&self) -> Result<(), Error> {
        for schema in self.inner.schemas.entities() {
            self.inner.repository.create_table(schema).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.inner.repository.kind())
            .field("entities", &self.inner.schemas.entities().count())
            .finish()
    }
}

// ==================== Default context ====================

static DEFAULT: Lazy<RwLock<Option<Context>>> = Lazy::new(|| RwLock::new(None));

/// Installs the process-wide default context, replacing any previous one.
pub fn set_default(context: Context) {
    *DEFAULT.write().unwrap_or_else(|e| e.into_inner()) = Some(context);
}

pub fn default_context() -> Result<Context, Error> {
    DEFAULT
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .ok_or_else(|| Error::Unsupported("no default context has been set".to_string()))
}

pub fn reset_default() {
    *DEFAULT.write().unwrap_or_else(|e| e.into_inner()) = None;
}
