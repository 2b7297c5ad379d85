mod aggregates;
mod codec;
mod filters;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::{
    cache::ObjectCache,
    config::{RepositoryConfig, SqliteConfig},
    error::Error,
    pushdown::{BackendKind, BackendPushDown, Capabilities, Output, PushDownRegistry, QueryPlan},
    record::{Model, Record},
    repository::{Repository, ResultRow},
    schema::EntitySchema,
    sql::{Dialect, SqliteDialect},
    value::{Row, Value},
};

/// Adds every SQLite push-down entry to `registry`.
pub fn register(registry: &mut PushDownRegistry) {
    registry.set_capabilities(BackendKind::Sqlite, Capabilities::all());
    filters::register(registry);
    aggregates::register(registry);
}

/// Relational repository over a sqlx SQLite pool.
///
/// Each entity lives in its own table with an auto-increment identifier.
/// Collections are answered with identifiers (plus pulled-up and aggregate
/// columns); full rows are read separately and kept in the object cache.
pub struct SqliteRepository {
    pool: SqlitePool,
    push_down: BackendPushDown,
    cache: ObjectCache,
    config: RepositoryConfig,
    statements: Mutex<VecDeque<String>>,
}

impl SqliteRepository {
    pub async fn connect(config: SqliteConfig) -> Result<Self, Error> {
        let mut options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_memory() {
            // Closing the last connection drops the database.
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options
            .connect(&config.url)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self::from_pool(pool, config.repository))
    }

    /// A private in-memory database.
    pub async fn new_memory() -> Result<Self, Error> {
        Self::connect(SqliteConfig::memory()).await
    }

    pub fn from_pool(pool: SqlitePool, config: RepositoryConfig) -> Self {
        let mut registry = PushDownRegistry::new();
        register(&mut registry);
        Self::with_registry(pool, config, &registry)
    }

    /// Uses the SQLite entries of a caller-assembled registry.
    pub fn with_registry(pool: SqlitePool, config: RepositoryConfig, registry: &PushDownRegistry) -> Self {
        let push_down = if config.push_down {
            registry.resolve(BackendKind::Sqlite)
        } else {
            BackendPushDown::none(BackendKind::Sqlite)
        };
        Self {
            pool,
            push_down,
            cache: ObjectCache::new(),
            config,
            statements: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Text of the most recently executed statements, oldest first. Empty
    /// unless `log_statements` is set.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_statements(&self) {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn log(&self, kind: &'static str, sql: &str, parameters: usize) {
        tracing::debug!(kind, parameters, sql, "executing statement");
        if self.config.log_statements {
            let mut statements = self.statements.lock().unwrap_or_else(|e| e.into_inner());
            if statements.len() >= self.config.statement_log_size.max(1) {
                statements.pop_front();
            }
            statements.push_back(sql.to_string());
        }
    }

    fn record_duration(kind: &'static str, start: Instant) {
        histogram!("hyle.statement.duration_ms",
            "kind" => kind
        )
        .record(start.elapsed().as_millis() as f64);
    }

    async fn fetch(&self, kind: &'static str, sql: &str, values: &[Value]) -> Result<Vec<sqlx::sqlite::SqliteRow>, Error> {
        self.log(kind, sql, values.len());
        let start = Instant::now();
        let rows = codec::bind_values(sqlx::query(sql), values)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::statement(sql, e))?;
        Self::record_duration(kind, start);
        Ok(rows)
    }

    async fn run(&self, kind: &'static str, sql: &str, values: &[Value]) -> Result<sqlx::sqlite::SqliteQueryResult, Error> {
        self.log(kind, sql, values.len());
        let start = Instant::now();
        let result = codec::bind_values(sqlx::query(sql), values)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::statement(sql, e))?;
        Self::record_duration(kind, start);
        Ok(result)
    }

    /// Schema columns of `record`, absent ones as `NULL`.
    fn table_row(schema: &EntitySchema, record: &Record) -> Row {
        schema
            .column_names()
            .map(|column| (column.to_string(), record.get(column)))
            .collect()
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
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
        let (sql, values) = plan.statement.render_select(&SqliteDialect, &plan.params);
        let rows = self.fetch("select", &sql, &values).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut id = Value::Null;
            let mut augmentation = Row::new();
            let mut hydrated = vec![Row::new(); plan.hydrate.len()];
            for (index, output) in plan.outputs.iter().enumerate() {
                let value = codec::decode(row, index)?;
                match output {
                    Output::Id => id = value,
                    Output::Augment(name) => {
                        augmentation.insert(name.clone(), value);
                    }
                    Output::Hydrate { join, column } => {
                        if let Some(target) = hydrated.get_mut(*join) {
                            target.insert(column.clone(), value);
                        }
                    }
                }
            }
            for (schema, joined) in plan.hydrate.iter().zip(hydrated) {
                if let Some(joined_id) = joined.get(&schema.id_column).cloned() {
                    self.cache.put(&schema.entity, &joined_id, joined);
                }
            }
            results.push(ResultRow {
                id,
                augmentation,
                row: None,
            });
        }
        Ok(results)
    }

    async fn calculate(&self, plan: &QueryPlan) -> Result<Vec<Value>, Error> {
        let (sql, values) = plan.statement.render_select(&SqliteDialect, &plan.params);
        let rows = self.fetch("aggregate", &sql, &values).await?;
        let Some(row) = rows.first() else {
            return Ok(vec![Value::Null; plan.outputs.len()]);
        };
        (0..plan.outputs.len())
            .map(|index| codec::decode(row, index))
            .collect()
    }

    async fn load_rows(&self, schema: &EntitySchema, ids: &[Value]) -> Result<Vec<Row>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let dialect = SqliteDialect;
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| dialect.placeholder(i)).collect();
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            dialect.quote_identifier(&schema.table),
            dialect.quote_identifier(&schema.id_column),
            placeholders.join(", ")
        );
        let rows = self.fetch("hydrate", &sql, ids).await?;
        rows.iter().map(codec::decode_row).collect()
    }

    async fn batch_update(&self, plan: &QueryPlan, values: &Row) -> Result<u64, Error> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut params = plan.params.clone();
        let assignments: Vec<(String, String)> = values
            .iter()
            .map(|(column, value)| (column.clone(), params.add(column, value.clone())))
            .collect();
        let (sql, bound) =
            plan.statement
                .render_update(&SqliteDialect, &params, &plan.schema.id_column, &assignments);
        let result = self.run("update", &sql, &bound).await?;
        Ok(result.rows_affected())
    }

    async fn batch_delete(&self, plan: &QueryPlan) -> Result<u64, Error> {
        let (sql, bound) =
            plan.statement
                .render_delete(&SqliteDialect, &plan.params, &plan.schema.id_column);
        let result = self.run("delete", &sql, &bound).await?;
        Ok(result.rows_affected())
    }

    async fn save(&self, schema: &EntitySchema, record: &mut Record) -> Result<(), Error> {
        let dialect = SqliteDialect;
        let is_new = record.is_new();
        let mut row = Self::table_row(schema, record);
        if is_new {
            row.remove(&schema.id_column);
        }
        let table = dialect.quote_identifier(&schema.table);
        let values: Vec<Value> = row.values().cloned().collect();
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns: Vec<String> = row.keys().map(|c| dialect.quote_identifier(c)).collect();
            let placeholders: Vec<String> = (1..=row.len()).map(|i| dialect.placeholder(i)).collect();
            format!(
                "{} INTO {} ({}) VALUES ({})",
                if is_new { "INSERT" } else { "INSERT OR REPLACE" },
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let result = self.run("save", &sql, &values).await?;
        if is_new {
            record.set(&schema.id_column, Value::Int(result.last_insert_rowid()));
        }

        let id = record.id();
        self.cache.put(&schema.entity, &id, Self::table_row(schema, record));
        Ok(())
    }

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> Result<bool, Error> {
        let dialect = SqliteDialect;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_identifier(&schema.table),
            dialect.quote_identifier(&schema.id_column),
            dialect.placeholder(1)
        );
        let result = self.run("delete", &sql, std::slice::from_ref(id)).await?;
        self.cache.evict(&schema.entity, id);
        Ok(result.rows_affected() > 0)
    }

    async fn create_table(&self, schema: &EntitySchema) -> Result<(), Error> {
        let dialect = SqliteDialect;
        let columns: Vec<String> = schema
            .columns
            .iter()
            .map(|column| codec::column_definition(column, dialect.quote_identifier(&column.name)))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote_identifier(&schema.table),
            columns.join(", ")
        );
        self.run("ddl", &sql, &[]).await?;
        Ok(())
    }
}
