use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    cache::ObjectCache,
    config::RepositoryConfig,
    error::Error,
    pushdown::{BackendKind, BackendPushDown, QueryPlan},
    record::{Model, Record},
    repository::{Repository, ResultRow},
    schema::EntitySchema,
    value::{Row, Value},
};

#[derive(Default)]
struct MemoryStore {
    tables: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
}

/// Rows kept in process. Nothing is pushed down: every collection is
/// answered with the entity's full table and evaluated by iteration.
pub struct MemoryRepository {
    store: Mutex<MemoryStore>,
    push_down: BackendPushDown,
    cache: ObjectCache,
    config: RepositoryConfig,
    executions: AtomicUsize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self {
            store: Mutex::new(MemoryStore::default()),
            push_down: BackendPushDown::none(BackendKind::Memory),
            cache: ObjectCache::new(),
            config,
            executions: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// How many result sets have been produced so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    fn scope_is_whole_table(plan: &QueryPlan) -> Result<(), Error> {
        if plan.statement.filter.is_some() || !plan.statement.joins.is_empty() {
            return Err(Error::Unsupported(format!(
                "memory repository cannot run a restricted batch on '{}'",
                plan.schema.entity
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn push_down(&self) -> &BackendPushDown {
        &self.push_down
    }

    fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    async fn execute(&self, plan: &QueryPlan) -> Result<Vec<ResultRow>, Error> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let schema = &plan.schema;
        let store = self.lock();
        let rows = store
            .tables
            .get(&schema.entity)
            .map(|rows| {
                rows.iter()
                    .map(|row| ResultRow {
                        id: row.get(&schema.id_column).cloned().unwrap_or(Value::Null),
                        augmentation: Row::new(),
                        row: Some(row.clone()),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        tracing::debug!(entity = %schema.entity, rows = rows.len(), "memory scan");
        Ok(rows)
    }

    async fn calculate(&self, plan: &QueryPlan) -> Result<Vec<Value>, Error> {
        Err(Error::Unsupported(format!(
            "memory repository has no native aggregates for '{}'",
            plan.schema.entity
        )))
    }

    async fn load_rows(&self, schema: &EntitySchema, ids: &[Value]) -> Result<Vec<Row>, Error> {
        let wanted: HashSet<String> = ids.iter().map(Value::key).collect();
        let store = self.lock();
        Ok(store
            .tables
            .get(&schema.entity)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.get(&schema.id_column)
                            .is_some_and(|id| wanted.contains(&id.key()))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_update(&self, plan: &QueryPlan, values: &Row) -> Result<u64, Error> {
        Self::scope_is_whole_table(plan)?;
        let mut store = self.lock();
        let rows = store.tables.entry(plan.schema.entity.clone()).or_default();
        for row in rows.iter_mut() {
            row.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(rows.len() as u64)
    }

    async fn batch_delete(&self, plan: &QueryPlan) -> Result<u64, Error> {
        Self::scope_is_whole_table(plan)?;
        let mut store = self.lock();
        let removed = store
            .tables
            .get_mut(&plan.schema.entity)
            .map(|rows| std::mem::take(rows).len())
            .unwrap_or(0);
        Ok(removed as u64)
    }

    async fn save(&self, schema: &EntitySchema, record: &mut Record) -> Result<(), Error> {
        let mut store = self.lock();
        if record.is_new() {
            let next = store
                .sequences
                .entry(schema.entity.clone())
                .or_insert(0);
            *next += 1;
            record.set(&schema.id_column, Value::Int(*next));
        } else if let Some(id) = record.id().as_int() {
            let next = store
                .sequences
                .entry(schema.entity.clone())
                .or_insert(0);
            *next = (*next).max(id);
        }

        let id = record.id();
        let row: Row = record
            .export_raw()
            .into_iter()
            .filter(|(column, _)| *column == schema.id_column || schema.has_column(column))
            .collect();
        let rows = store.tables.entry(schema.entity.clone()).or_default();
        match rows
            .iter_mut()
            .find(|existing| existing.get(&schema.id_column).is_some_and(|v| v.key() == id.key()))
        {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        self.cache.put(&schema.entity, &id, row);
        Ok(())
    }

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> Result<bool, Error> {
        let mut store = self.lock();
        let removed = store
            .tables
            .get_mut(&schema.entity)
            .map(|rows| {
                let before = rows.len();
                rows.retain(|row| row.get(&schema.id_column).is_none_or(|v| v.key() != id.key()));
                before != rows.len()
            })
            .unwrap_or(false);
        self.cache.evict(&schema.entity, id);
        Ok(removed)
    }

    async fn create_table(&self, schema: &EntitySchema) -> Result<(), Error> {
        self.lock().tables.entry(schema.entity.clone()).or_default();
        Ok(())
    }
}
