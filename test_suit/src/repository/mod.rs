use std::sync::Arc;

use chrono::NaiveDate;
use hyle::{
    ColumnType, Context, EntitySchema, MemoryRepository, Model, RepositoryConfig, SchemaRegistry,
    SqliteConfig, SqliteRepository, Value,
};

pub mod test_equivalence;
pub mod test_memory;
pub mod test_sqlite;

/// Companies with contacts. Acme has three contacts, Umbrella has no region.
pub fn schemas() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            EntitySchema::new("Company", "tblCompany")
                .id("CompanyID")
                .column("Name", ColumnType::Text)
                .column("Balance", ColumnType::Integer)
                .column("Region", ColumnType::Text)
                .column("Founded", ColumnType::Date)
                .column("Tags", ColumnType::Json)
                .has_many("Contacts", "Contact", "CompanyID", "CompanyID"),
        )
        .with(
            EntitySchema::new("Contact", "tblContact")
                .id("ContactID")
                .column("CompanyID", ColumnType::Integer)
                .column("Name", ColumnType::Text)
                .belongs_to("Company", "Company", "CompanyID", "CompanyID"),
        )
}

const COMPANIES: [(&str, i64, Option<&str>, (i32, u32, u32), &str); 6] = [
    ("Acme", 10, Some("north"), (2024, 1, 1), r#"["tools","retail"]"#),
    ("Globex", 30, Some("south"), (2024, 1, 2), r#"["energy"]"#),
    ("Initech", 20, Some("north"), (2024, 1, 3), r#"[]"#),
    ("Umbrella", 50, None, (2024, 1, 6), r#"["pharma","retail"]"#),
    ("Hooli", 40, Some("south"), (2024, 1, 7), r#"["search"]"#),
    ("Stark", 20, Some("east"), (2024, 1, 8), r#"["tools"]"#),
];

const CONTACTS: [(i64, &str); 5] = [
    (1, "Ann"),
    (1, "Bob"),
    (1, "Cid"),
    (2, "Dee"),
    (5, "Eve"),
];

pub async fn seed(context: &Context) {
    context.create_tables().await.unwrap();
    for (name, balance, region, (y, m, d), tags) in COMPANIES {
        let mut company = context
            .record("Company")
            .unwrap()
            .with("Name", name)
            .with("Balance", balance)
            .with("Region", region)
            .with("Founded", NaiveDate::from_ymd_opt(y, m, d).unwrap())
            .with("Tags", tags);
        context.save(&mut company).await.unwrap();
    }
    for (company, name) in CONTACTS {
        let mut contact = context
            .record("Contact")
            .unwrap()
            .with("CompanyID", company)
            .with("Name", name);
        context.save(&mut contact).await.unwrap();
    }
}

/// SQLite over a private memory database, seeded, with the statement log on.
pub async fn sqlite_context(config: RepositoryConfig) -> (Context, Arc<SqliteRepository>) {
    let repository = Arc::new(
        SqliteRepository::connect(SqliteConfig {
            repository: RepositoryConfig {
                log_statements: true,
                ..config
            },
            ..SqliteConfig::memory()
        })
        .await
        .unwrap(),
    );
    let context = Context::with_repository(schemas(), repository.clone());
    seed(&context).await;
    repository.clear_statements();
    (context, repository)
}

pub async fn memory_context() -> (Context, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::new());
    let context = Context::with_repository(schemas(), repository.clone());
    seed(&context).await;
    (context, repository)
}

/// The three backends every behaviour is checked against: SQLite with and
/// without push-down, and the in-process repository.
pub async fn all_contexts() -> Vec<(&'static str, Context)> {
    vec![
        ("sqlite", sqlite_context(RepositoryConfig::default()).await.0),
        (
            "sqlite without push-down",
            sqlite_context(RepositoryConfig::without_push_down()).await.0,
        ),
        ("memory", memory_context().await.0),
    ]
}

pub fn names(records: &[hyle::Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| match record.get("Name") {
            Value::Text(name) => name,
            other => other.to_string(),
        })
        .collect()
}
