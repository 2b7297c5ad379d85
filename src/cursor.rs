use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    error::Error,
    record::{Model, Record},
    repository::{Repository, ResultRow},
    schema::EntitySchema,
    value::{Row, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Uninitialized,
    Positioned(usize),
    Exhausted,
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    id: Value,
    /// Column → (sequence number, value). The sequence decides which value
    /// survives when duplicates fold together.
    augmentation: BTreeMap<String, (u64, Value)>,
}

impl Entry {
    fn augmentation_row(&self) -> Row {
        self.augmentation
            .iter()
            .map(|(column, (_, value))| (column.clone(), value.clone()))
            .collect()
    }
}

/// Ordered view over a collection's result set.
///
/// Entries are identifiers plus augmentation data; full rows come from the
/// backend result (in-memory repositories), the shared object cache, or a
/// batched `load_rows` call. A second occurrence of an identifier gets the
/// synthetic key `"{id}__{n}"` so every entry stays addressable.
pub struct Cursor {
    schema: Arc<EntitySchema>,
    repository: Arc<dyn Repository>,
    entries: Vec<Entry>,
    visible: Vec<usize>,
    excluded: HashSet<String>,
    /// Synthetic key → canonical key.
    duplicates: HashMap<String, String>,
    occurrences: HashMap<String, usize>,
    rows: HashMap<String, Row>,
    memo: HashMap<String, Record>,
    sequence: u64,
    state: CursorState,
    backend_count: usize,
}

impl Cursor {
    pub fn new(schema: Arc<EntitySchema>, repository: Arc<dyn Repository>, rows: Vec<ResultRow>) -> Self {
        let mut cursor = Self {
            schema,
            repository,
            entries: Vec::with_capacity(rows.len()),
            visible: Vec::new(),
            excluded: HashSet::new(),
            duplicates: HashMap::new(),
            occurrences: HashMap::new(),
            rows: HashMap::new(),
            memo: HashMap::new(),
            sequence: 0,
            state: CursorState::Uninitialized,
            backend_count: rows.len(),
        };
        for row in rows {
            cursor.push(row.id, row.augmentation, row.row);
        }
        cursor.refresh();
        cursor
    }

    fn push(&mut self, id: Value, augmentation: Row, row: Option<Row>) {
        let canonical = id.key();
        let seen = self.occurrences.entry(canonical.clone()).or_insert(0);
        let key = if *seen == 0 {
            canonical.clone()
        } else {
            let synthetic = format!("{}__{}", canonical, seen);
            self.duplicates.insert(synthetic.clone(), canonical.clone());
            synthetic
        };
        *seen += 1;
        if let Some(row) = row {
            self.rows.insert(canonical, row);
        }
        self.sequence += 1;
        let sequence = self.sequence;
        self.entries.push(Entry {
            key,
            id,
            augmentation: augmentation
                .into_iter()
                .map(|(column, value)| (column, (sequence, value)))
                .collect(),
        });
    }

    fn refresh(&mut self) {
        self.visible = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !self.excluded.contains(&entry.key))
            .map(|(index, _)| index)
            .collect();
        self.memo.clear();
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Rows the backend returned, before any in-memory work.
    pub fn backend_count(&self) -> usize {
        self.backend_count
    }

    pub fn count(&self) -> usize {
        self.visible.len()
    }

    pub fn rewind(&mut self) {
        self.state = CursorState::Positioned(0);
    }

    pub fn valid(&self) -> bool {
        matches!(self.state, CursorState::Positioned(i) if i < self.visible.len())
    }

    pub async fn current(&mut self) -> Result<Option<Record>, Error> {
        match self.state {
            CursorState::Positioned(i) if i < self.visible.len() => self.get(i).await,
            _ => Ok(None),
        }
    }

    pub fn advance(&mut self) {
        self.state = match self.state {
            CursorState::Uninitialized => CursorState::Positioned(0),
            CursorState::Positioned(i) if i + 1 < self.visible.len() => CursorState::Positioned(i + 1),
            _ => CursorState::Exhausted,
        };
    }

    /// The record under the cursor, then moves past it.
    pub async fn next(&mut self) -> Result<Option<Record>, Error> {
        if self.state == CursorState::Uninitialized {
            self.rewind();
        }
        if !self.valid() {
            self.state = CursorState::Exhausted;
            return Ok(None);
        }
        let record = self.current().await?;
        self.advance();
        Ok(record)
    }

    pub fn keys(&self) -> Vec<String> {
        self.visible.iter().map(|&i| self.entries[i].key.clone()).collect()
    }

    pub fn ids(&self) -> Vec<Value> {
        self.visible.iter().map(|&i| self.entries[i].id.clone()).collect()
    }

    /// The record at visible position `i`, hydrating it (and the uncached
    /// records after it, one batch at a time) on first access.
    pub async fn get(&mut self, i: usize) -> Result<Option<Record>, Error> {
        let Some(&index) = self.visible.get(i) else {
            return Ok(None);
        };
        let key = self.entries[index].key.clone();
        if let Some(record) = self.memo.get(&key) {
            return Ok(Some(record.clone()));
        }

        if !self.rows.contains_key(&self.entries[index].id.key()) {
            let batch = self.repository.config().hydrate_batch_size.max(1);
            let window: Vec<usize> = self.visible[i..].iter().copied().take(batch).collect();
            self.load(&window).await?;
        }

        let entry = &self.entries[index];
        let record = self.record_of(entry).ok_or_else(|| {
            Error::not_found(self.schema.entity.as_str(), &entry.id)
        })?;
        self.memo.insert(key, record.clone());
        Ok(Some(record))
    }

    /// Hydrates every visible entry.
    pub async fn hydrate_all(&mut self) -> Result<(), Error> {
        let batch = self.repository.config().hydrate_batch_size.max(1);
        let visible = self.visible.clone();
        for window in visible.chunks(batch) {
            self.load(window).await?;
        }
        for &index in &visible {
            let entry = &self.entries[index];
            if !self.rows.contains_key(&entry.id.key()) {
                return Err(Error::not_found(self.schema.entity.as_str(), &entry.id));
            }
        }
        Ok(())
    }

    async fn load(&mut self, indices: &[usize]) -> Result<(), Error> {
        let cache = self.repository.cache();
        let mut missing = Vec::new();
        let mut requested = HashSet::new();
        for &index in indices {
            let id = &self.entries[index].id;
            let key = id.key();
            if self.rows.contains_key(&key) || !requested.insert(key.clone()) {
                continue;
            }
            match cache.get(&self.schema.entity, id) {
                Some(row) => {
                    self.rows.insert(key, row);
                }
                None => missing.push(id.clone()),
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        tracing::trace!(entity = %self.schema.entity, count = missing.len(), "hydrating records");
        for row in self.repository.load_rows(&self.schema, &missing).await? {
            let id = row.get(&self.schema.id_column).cloned().unwrap_or(Value::Null);
            cache.put(&self.schema.entity, &id, row.clone());
            self.rows.insert(id.key(), row);
        }
        Ok(())
    }

    fn record_of(&self, entry: &Entry) -> Option<Record> {
        let row = self.rows.get(&entry.id.key())?;
        let mut record = Record::from_row(&self.schema, row.clone());
        record.merge_raw(entry.augmentation_row());
        Some(record)
    }

    /// Visible `(key, record)` pairs of already hydrated entries.
    pub fn records(&self) -> Vec<(String, Record)> {
        self.visible
            .iter()
            .filter_map(|&i| {
                let entry = &self.entries[i];
                self.record_of(entry).map(|record| (entry.key.clone(), record))
            })
            .collect()
    }

    /// Excludes entries from iteration and count.
    pub fn filter_out<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        self.excluded.extend(keys);
        self.refresh();
    }

    fn canonical<'k>(&'k self, key: &'k str) -> &'k str {
        self.duplicates.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Merges `row` into the entry for `key` and every duplicate of it.
    pub fn augment(&mut self, key: &str, row: Row) {
        let canonical = self.canonical(key).to_string();
        self.sequence += 1;
        let sequence = self.sequence;
        for entry in self.entries.iter_mut() {
            let owner = self
                .duplicates
                .get(&entry.key)
                .map(String::as_str)
                .unwrap_or(&entry.key);
            if owner != canonical {
                continue;
            }
            for (column, value) in &row {
                entry
                    .augmentation
                    .insert(column.clone(), (sequence, value.clone()));
            }
        }
        self.memo.clear();
    }

    /// Replaces each visible entry with one entry per row in `expansions`
    /// (matched by key); an empty list drops the entry. Keys are reassigned,
    /// so a repeated identifier gets a fresh synthetic key.
    pub fn fan_out(&mut self, mut expansions: HashMap<String, Vec<Row>>) {
        let entries = std::mem::take(&mut self.entries);
        let excluded = std::mem::take(&mut self.excluded);
        self.duplicates.clear();
        self.occurrences.clear();

        for entry in entries {
            if excluded.contains(&entry.key) {
                continue;
            }
            let Some(rows) = expansions.remove(&entry.key) else {
                continue;
            };
            for pulled in rows {
                self.sequence += 1;
                let sequence = self.sequence;
                let mut augmentation = entry.augmentation.clone();
                for (column, value) in pulled {
                    augmentation.insert(column, (sequence, value));
                }
                let row = self.rows.get(&entry.id.key()).cloned();
                self.push(entry.id.clone(), Row::new(), row);
                if let Some(last) = self.entries.last_mut() {
                    last.augmentation = augmentation;
                }
            }
        }
        self.refresh();
    }

    /// Folds duplicate entries into their canonical entry. For each column
    /// the most recently applied augmentation wins.
    pub fn deduplicate(&mut self) {
        if self.duplicates.is_empty() {
            return;
        }
        let excluded = std::mem::take(&mut self.excluded);
        self.entries.retain(|entry| !excluded.contains(&entry.key));

        let duplicates = std::mem::take(&mut self.duplicates);
        let canonical_of = |key: &String| duplicates.get(key).cloned().unwrap_or_else(|| key.clone());

        let mut folded: HashMap<String, BTreeMap<String, (u64, Value)>> = HashMap::new();
        for entry in &self.entries {
            let target = folded.entry(canonical_of(&entry.key)).or_default();
            for (column, (sequence, value)) in &entry.augmentation {
                match target.get(column) {
                    Some((existing, _)) if existing > sequence => {}
                    _ => {
                        target.insert(column.clone(), (*sequence, value.clone()));
                    }
                }
            }
        }

        let mut kept = HashSet::new();
        self.entries.retain(|entry| kept.insert(canonical_of(&entry.key)));
        for entry in self.entries.iter_mut() {
            let canonical = canonical_of(&entry.key);
            if let Some(augmentation) = folded.remove(&canonical) {
                entry.augmentation = augmentation;
            }
            entry.key = canonical;
        }
        self.occurrences = self
            .entries
            .iter()
            .map(|entry| (entry.key.clone(), 1))
            .collect();
        self.refresh();
    }

    /// Stable sort of the visible entries; `compare` receives hydrated records.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&Record, &Record) -> Ordering) {
        let records: HashMap<String, Record> = self.records().into_iter().collect();
        let mut visible: Vec<Entry> = self
            .visible
            .iter()
            .map(|&i| self.entries[i].clone())
            .collect();
        visible.sort_by(|a, b| match (records.get(&a.key), records.get(&b.key)) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        });
        self.entries = visible;
        self.excluded.clear();
        self.refresh();
    }

    /// Keeps `count` visible entries starting at `offset`.
    pub fn apply_range(&mut self, offset: usize, count: usize) {
        let kept: Vec<Entry> = self
            .visible
            .iter()
            .skip(offset)
            .take(count)
            .map(|&i| self.entries[i].clone())
            .collect();
        self.entries = kept;
        self.excluded.clear();
        self.refresh();
        if let CursorState::Positioned(_) = self.state {
            self.state = CursorState::Positioned(0);
        }
    }
}
