//! Lazy, composable result sets.
//!
//! A [`Collection`] only describes a query until something asks for a record
//! or a count. At that point it is planned once, the backend answers what it
//! can, the rest is evaluated in memory, and the resulting [`Cursor`] is kept
//! until the collection's criteria change.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::Aggregate,
    context::Context,
    cursor::Cursor,
    error::Error,
    filter::Filter,
    intersection::{Intersection, IntersectionRole},
    pushdown::{Planner, Prepared},
    record::{Model, Record},
    sql::JoinKind,
    value::{Row, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub offset: usize,
    pub count: usize,
}

pub struct Collection {
    context: Context,
    entity: String,
    pub(crate) filter: Option<Filter>,
    pub(crate) sorts: Vec<Sort>,
    pub(crate) range: Option<Range>,
    pub(crate) aggregates: Vec<Aggregate>,
    pub(crate) intersections: Vec<Intersection>,
    pub(crate) distinct: bool,
    cursor: Option<Cursor>,
}

impl Clone for Collection {
    /// The clone starts without a cursor.
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            entity: self.entity.clone(),
            filter: self.filter.clone(),
            sorts: self.sorts.clone(),
            range: self.range,
            aggregates: self.aggregates.clone(),
            intersections: self.intersections.clone(),
            distinct: self.distinct,
            cursor: None,
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("entity", &self.entity)
            .field("filter", &self.filter)
            .field("sorts", &self.sorts)
            .field("range", &self.range)
            .field("aggregates", &self.aggregates)
            .field("intersections", &self.intersections)
            .field("distinct", &self.distinct)
            .field("fetched", &self.cursor.is_some())
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(context: Context, entity: &str) -> Self {
        Self {
            context,
            entity: entity.to_string(),
            filter: None,
            sorts: Vec::new(),
            range: None,
            aggregates: Vec::new(),
            intersections: Vec::new(),
            distinct: false,
            cursor: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn filter_ref(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn range_ref(&self) -> Option<Range> {
        self.range
    }

    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    // ==================== Builders ====================

    /// AND-composes with the current filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.add_filter(filter);
        self
    }

    pub fn sort(mut self, column: &str, direction: SortDirection) -> Self {
        self.add_sort(column, direction);
        self
    }

    pub fn range(mut self, offset: usize, count: usize) -> Self {
        self.set_range(Some(Range { offset, count }));
        self
    }

    pub fn intersect_with(mut self, intersection: Intersection) -> Self {
        self.add_intersection(intersection);
        self
    }

    /// Adds a per-record aggregate, readable on each record under its alias.
    pub fn aggregate_column(mut self, aggregate: Aggregate) -> Self {
        self.add_aggregate_column(aggregate);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.set_distinct(true);
        self
    }

    // ==================== In-place changes ====================
    // Each of these drops the cursor.

    pub fn add_filter(&mut self, filter: Filter) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_with(filter),
            None => filter,
        });
        self.invalidate();
    }

    pub fn replace_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
        self.invalidate();
    }

    pub(crate) fn take_filter(&mut self) -> Option<Filter> {
        self.invalidate();
        self.filter.take()
    }

    pub fn add_sort(&mut self, column: &str, direction: SortDirection) {
        self.sorts.push(Sort {
            column: column.to_string(),
            direction,
        });
        self.invalidate();
    }

    pub fn replace_sort(&mut self, sorts: Vec<Sort>) {
        self.sorts = sorts;
        self.invalidate();
    }

    pub fn set_range(&mut self, range: Option<Range>) {
        self.range = range;
        self.invalidate();
    }

    pub fn add_intersection(&mut self, intersection: Intersection) {
        self.intersections.push(intersection);
        self.invalidate();
    }

    pub fn add_aggregate_column(&mut self, aggregate: Aggregate) {
        self.aggregates.push(aggregate);
        self.invalidate();
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
        self.invalidate();
    }

    /// Forget the fetched result; the next access plans and fetches again.
    pub fn invalidate(&mut self) {
        self.cursor = None;
    }

    // ==================== Reading ====================

    /// The cursor, fetching it on first use.
    pub async fn cursor(&mut self) -> Result<&mut Cursor, Error> {
        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => build_cursor(self).await?,
        };
        Ok(self.cursor.insert(cursor))
    }

    pub async fn count(&mut self) -> Result<usize, Error> {
        Ok(self.cursor().await?.count())
    }

    pub async fn get(&mut self, i: usize) -> Result<Option<Record>, Error> {
        self.cursor().await?.get(i).await
    }

    pub async fn next(&mut self) -> Result<Option<Record>, Error> {
        self.cursor().await?.next().await
    }

    pub async fn rewind(&mut self) -> Result<(), Error> {
        self.cursor().await?.rewind();
        Ok(())
    }

    pub async fn first(&mut self) -> Result<Option<Record>, Error> {
        self.get(0).await
    }

    pub async fn to_vec(&mut self) -> Result<Vec<Record>, Error> {
        let cursor = self.cursor().await?;
        let mut records = Vec::with_capacity(cursor.count());
        for i in 0..cursor.count() {
            if let Some(record) = cursor.get(i).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn ids(&mut self) -> Result<Vec<Value>, Error> {
        Ok(self.cursor().await?.ids())
    }

    /// The first entry with identifier `id`, if the collection contains it.
    pub async fn find(&mut self, id: &Value) -> Result<Option<Record>, Error> {
        let cursor = self.cursor().await?;
        match cursor.ids().iter().position(|candidate| candidate.key() == id.key()) {
            Some(position) => cursor.get(position).await,
            None => Ok(None),
        }
    }

    // ==================== Aggregates ====================

    /// Scalar aggregates over the whole filtered set, keyed by alias. Sorts
    /// and range do not apply.
    pub async fn calculate_aggregates(&self, aggregates: Vec<Aggregate>) -> Result<Row, Error> {
        let repository = self.context.repository().clone();
        let mut prepared = Prepared::scalar(self, aggregates)?;

        if self.aggregates.is_empty() {
            let plan = Planner::new(repository.push_down()).plan_aggregates(&mut prepared)?;
            if let Some(plan) = plan {
                let values = repository.calculate(&plan).await?;
                return Ok(prepared
                    .aggregates
                    .iter()
                    .map(|aggregate| aggregate.alias().to_string())
                    .zip(values)
                    .collect());
            }
        }

        fallback("aggregate", &self.entity);
        let mut whole = self.clone();
        whole.sorts.clear();
        whole.range = None;
        let mut cursor = build_cursor(&whole).await?;
        cursor.hydrate_all().await?;
        let records = cursor.records();

        let mut sources = Vec::new();
        for intersection in prepared
            .intersections
            .iter()
            .filter(|i| i.role == IntersectionRole::Aggregate)
        {
            sources.push(fetch_matches(intersection).await?);
        }

        let mut results = Row::new();
        for aggregate in prepared.aggregates.iter_mut() {
            let source = sources.iter().find(|source| source.provides(aggregate.column()));
            for (_, record) in &records {
                match source {
                    Some(source) => {
                        for value in source.values(record, aggregate.column()) {
                            aggregate.accumulate(&value, "");
                        }
                    }
                    None => aggregate.calculate_by_iteration(record, ""),
                }
            }
            results.insert(aggregate.alias().to_string(), aggregate.result("")?);
        }
        Ok(results)
    }

    // ==================== Batch operations ====================

    /// Sets `values` on every record of the collection with one native
    /// statement. When the backend cannot express the whole collection the
    /// call fails with `InfeasibleBatch` before writing anything, unless
    /// `fall_back_to_iteration` allows saving record by record.
    pub async fn batch_update(&mut self, values: Row, fall_back_to_iteration: bool) -> Result<u64, Error> {
        let repository = self.context.repository().clone();
        let schema = self.context.schema(&self.entity)?;
        let mut prepared = Prepared::new(self)?;
        let plan = Planner::new(repository.push_down()).plan(&mut prepared)?;

        let affected = if batch_feasible(&prepared, &plan) {
            repository.batch_update(&plan, &values).await?
        } else if fall_back_to_iteration {
            fallback("batch", &self.entity);
            let mut affected = 0;
            for mut record in self.distinct_records().await? {
                record.merge_raw(values.clone());
                repository.save(&schema, &mut record).await?;
                affected += 1;
            }
            affected
        } else {
            return Err(Error::InfeasibleBatch(format!(
                "update of '{}' cannot be expressed as one statement",
                self.entity
            )));
        };

        repository.cache().evict_entity(&self.entity);
        self.invalidate();
        Ok(affected)
    }

    /// Deletes every record of the collection; same rules as `batch_update`.
    pub async fn batch_delete(&mut self, fall_back_to_iteration: bool) -> Result<u64, Error> {
        let repository = self.context.repository().clone();
        let schema = self.context.schema(&self.entity)?;
        let mut prepared = Prepared::new(self)?;
        let plan = Planner::new(repository.push_down()).plan(&mut prepared)?;

        let affected = if batch_feasible(&prepared, &plan) {
            repository.batch_delete(&plan).await?
        } else if fall_back_to_iteration {
            fallback("batch", &self.entity);
            let mut affected = 0;
            for record in self.distinct_records().await? {
                if repository.delete(&schema, &record.id()).await? {
                    affected += 1;
                }
            }
            affected
        } else {
            return Err(Error::InfeasibleBatch(format!(
                "delete from '{}' cannot be expressed as one statement",
                self.entity
            )));
        };

        repository.cache().evict_entity(&self.entity);
        self.invalidate();
        Ok(affected)
    }

    /// One record per identifier, without augmentation columns.
    async fn distinct_records(&mut self) -> Result<Vec<Record>, Error> {
        let schema = self.context.schema(&self.entity)?;
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for record in self.to_vec().await? {
            if !seen.insert(record.id().key()) {
                continue;
            }
            let row: Row = record
                .export_raw()
                .into_iter()
                .filter(|(column, _)| schema.has_column(column))
                .collect();
            records.push(Record::from_row(&schema, row));
        }
        Ok(records)
    }
}

fn batch_feasible(prepared: &Prepared, plan: &crate::pushdown::QueryPlan) -> bool {
    prepared.range.is_none()
        && plan.native.restricts_completely()
        && (prepared.aggregates.is_empty() || plan.native.aggregates)
}

fn fallback(stage: &'static str, entity: &str) {
    counter!("hyle.fallback.total", "stage" => stage).increment(1);
    tracing::debug!(stage, entity, "evaluating in memory");
}

fn join_key(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| value.key())
}

/// Child rows of an intersection keyed by their join column, each carrying
/// the pulled-up columns.
struct Matches {
    parent_column: String,
    aliases: Vec<String>,
    rows: HashMap<String, Vec<Row>>,
}

impl Matches {
    fn provides(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }

    fn rows_for(&self, record: &Record) -> Option<&Vec<Row>> {
        join_key(&record.get(&self.parent_column)).and_then(|key| self.rows.get(&key))
    }

    fn values(&self, record: &Record, alias: &str) -> Vec<Value> {
        self.rows_for(record)
            .map(|rows| {
                rows.iter()
                    .map(|row| row.get(alias).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn fetch_matches(intersection: &Intersection) -> Result<Matches, Error> {
    let mut cursor = build_cursor(&intersection.collection).await?;
    cursor.hydrate_all().await?;
    let mut rows: HashMap<String, Vec<Row>> = HashMap::new();
    for (_, record) in cursor.records() {
        let Some(key) = join_key(&record.get(&intersection.child_column)) else {
            continue;
        };
        let pulled = intersection
            .pull_up
            .iter()
            .map(|pull| (pull.alias.clone(), record.get(&pull.column)))
            .collect();
        rows.entry(key).or_default().push(pulled);
    }
    Ok(Matches {
        parent_column: intersection.parent_column.clone(),
        aliases: intersection.pull_up.iter().map(|p| p.alias.clone()).collect(),
        rows,
    })
}

fn compare_records(sorts: &[Sort], a: &Record, b: &Record) -> Ordering {
    for sort in sorts {
        let ordering = a.get(&sort.column).sort_cmp(&b.get(&sort.column));
        let ordering = match sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

type CursorFuture<'a> = Pin<Box<dyn Future<Output = Result<Cursor, Error>> + Send + 'a>>;

/// Plans `collection`, runs the statement and applies in memory, in order,
/// whatever the backend left over: intersections, aggregates, the filter,
/// de-duplication, sorting and the range.
fn build_cursor(collection: &Collection) -> CursorFuture<'_> {
    Box::pin(async move {
        let repository = collection.context.repository().clone();
        let mut prepared = Prepared::new(collection)?;
        let plan = Planner::new(repository.push_down()).plan(&mut prepared)?;
        let rows = repository.execute(&plan).await?;
        let mut cursor = Cursor::new(plan.schema.clone(), repository.clone(), rows);
        let native = &plan.native;
        let entity = collection.entity.as_str();

        let aggregates_pending = !prepared.aggregates.is_empty() && !native.aggregates;
        if !native.restricts_completely() || !native.sorts || aggregates_pending {
            cursor.hydrate_all().await?;
        }

        let mut sources = Vec::new();
        for (index, intersection) in prepared.intersections.iter().enumerate() {
            if native.intersections.get(index).copied().unwrap_or(false) {
                continue;
            }
            fallback("intersection", entity);
            let matches = fetch_matches(intersection).await?;
            if intersection.role == IntersectionRole::Aggregate {
                sources.push(matches);
            } else if intersection.is_semi() {
                let rejected: Vec<String> = cursor
                    .records()
                    .into_iter()
                    .filter(|(_, record)| matches.rows_for(record).is_none())
                    .map(|(key, _)| key)
                    .collect();
                cursor.filter_out(rejected);
            } else {
                let unmatched: Row = matches
                    .aliases
                    .iter()
                    .map(|alias| (alias.clone(), Value::Null))
                    .collect();
                let expansions = cursor
                    .records()
                    .into_iter()
                    .filter_map(|(key, record)| match matches.rows_for(&record) {
                        Some(rows) => Some((key, rows.clone())),
                        None if intersection.kind == JoinKind::Left => {
                            Some((key, vec![unmatched.clone()]))
                        }
                        None => None,
                    })
                    .collect();
                cursor.fan_out(expansions);
            }
        }

        if aggregates_pending {
            fallback("aggregate", entity);
            let records = cursor.records();
            let mut seen = HashSet::new();
            let mut per_record: HashMap<String, Row> = HashMap::new();
            for (_, record) in &records {
                let group = record.id().key();
                if !seen.insert(group.clone()) {
                    continue;
                }
                for aggregate in prepared.aggregates.iter_mut() {
                    match sources.iter().find(|s| s.provides(aggregate.column())) {
                        Some(source) => {
                            for value in source.values(record, aggregate.column()) {
                                aggregate.accumulate(&value, &group);
                            }
                        }
                        None => aggregate.calculate_by_iteration(record, &group),
                    }
                    per_record
                        .entry(group.clone())
                        .or_default()
                        .insert(aggregate.alias().to_string(), aggregate.result(&group)?);
                }
            }
            for (key, row) in per_record {
                cursor.augment(&key, row);
            }
        }

        if !native.filter {
            if let Some(filter) = &prepared.filter {
                fallback("filter", entity);
                let rejected: Vec<String> = cursor
                    .records()
                    .into_iter()
                    .filter(|(_, record)| filter.evaluate_remaining(record))
                    .map(|(key, _)| key)
                    .collect();
                cursor.filter_out(rejected);
            }
        }

        if prepared.distinct {
            cursor.deduplicate();
        }

        if !native.sorts {
            fallback("sort", entity);
            let sorts = prepared.sorts.clone();
            cursor.sort_by(|a, b| compare_records(&sorts, a, b));
        }

        if !native.range {
            if let Some(range) = prepared.range {
                fallback("range", entity);
                cursor.apply_range(range.offset, range.count);
            }
        }

        tracing::debug!(
            entity,
            fetched = cursor.backend_count(),
            visible = cursor.count(),
            "cursor ready"
        );
        Ok(cursor)
    })
}
