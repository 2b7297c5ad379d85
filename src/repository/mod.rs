mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use crate::{
    cache::ObjectCache,
    config::RepositoryConfig,
    error::Error,
    pushdown::{BackendKind, BackendPushDown, QueryPlan},
    record::Record,
    schema::EntitySchema,
    value::{Row, Value},
};

/// One entry of a backend result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id: Value,
    pub augmentation: Row,
    /// The full row, when the backend returns it anyway.
    pub row: Option<Row>,
}

/// -----------------------------
/// Repository contract
/// -----------------------------

#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The push-down table planners consult; empty when push-down is disabled.
    fn push_down(&self) -> &BackendPushDown;

    fn cache(&self) -> &ObjectCache;

    fn config(&self) -> &RepositoryConfig;

    /// Runs the planned SELECT; one result row per backend row, in backend order.
    async fn execute(&self, plan: &QueryPlan) -> Result<Vec<ResultRow>, Error>;

    /// Runs a scalar aggregate plan; one value per `Output::Augment`.
    async fn calculate(&self, plan: &QueryPlan) -> Result<Vec<Value>, Error>;

    /// Full rows for `ids`. Missing identifiers are simply absent.
    async fn load_rows(&self, schema: &EntitySchema, ids: &[Value]) -> Result<Vec<Row>, Error>;

    /// `UPDATE ... WHERE id IN (<plan>)`; only called for fully native plans.
    async fn batch_update(&self, plan: &QueryPlan, values: &Row) -> Result<u64, Error>;

    async fn batch_delete(&self, plan: &QueryPlan) -> Result<u64, Error>;

    /// Inserts new records (assigning the identifier) and updates existing ones.
    async fn save(&self, schema: &EntitySchema, record: &mut Record) -> Result<(), Error>;

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> Result<bool, Error>;

    async fn create_table(&self, schema: &EntitySchema) -> Result<(), Error>;
}
