use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::value::{Row, Value};

/// Raw row data shared by every collection built against one repository,
/// keyed by entity then identifier.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: Mutex<HashMap<String, HashMap<String, Row>>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Row>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, entity: &str, id: &Value) -> Option<Row> {
        let found = self
            .lock()
            .get(entity)
            .and_then(|rows| rows.get(&id.key()))
            .cloned();
        if found.is_some() {
            metrics::counter!("hyle.cache.hits", "entity" => entity.to_string()).increment(1);
        } else {
            metrics::counter!("hyle.cache.misses", "entity" => entity.to_string()).increment(1);
        }
        found
    }

    pub fn contains(&self, entity: &str, id: &Value) -> bool {
        self.lock()
            .get(entity)
            .is_some_and(|rows| rows.contains_key(&id.key()))
    }

    pub fn put(&self, entity: &str, id: &Value, row: Row) {
        if id.is_null() {
            return;
        }
        self.lock()
            .entry(entity.to_string())
            .or_default()
            .insert(id.key(), row);
    }

    pub fn evict(&self, entity: &str, id: &Value) {
        if let Some(rows) = self.lock().get_mut(entity) {
            rows.remove(&id.key());
        }
    }

    pub fn evict_entity(&self, entity: &str) {
        self.lock().remove(entity);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self, entity: &str) -> usize {
        self.lock().get(entity).map_or(0, HashMap::len)
    }
}
