use hyle::{
    Error, Filter, Model, Repository, RepositoryConfig, Row, SortDirection, SqliteConfig, SqliteRepository, Value,
    filter,
};

use super::*;

fn selects(statements: &[String]) -> Vec<&String> {
    statements.iter().filter(|sql| sql.starts_with("SELECT")).collect()
}

#[tokio::test]
async fn test_sort_and_limit_pushed_down_together() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut companies = context
        .collection("Company")
        .sort("Name", SortDirection::Ascending)
        .range(0, 3);
    assert_eq!(names(&companies.to_vec().await.unwrap()), vec!["Acme", "Globex", "Hooli"]);
    assert_eq!(companies.cursor().await.unwrap().backend_count(), 3);

    let statements = repository.statements();
    let select = selects(&statements)[0];
    assert!(select.contains("ORDER BY \"Company\".\"Name\" ASC"), "{}", select);
    assert!(select.ends_with("LIMIT 3 OFFSET 0"), "{}", select);
}

#[tokio::test]
async fn test_unresolvable_sort_keeps_limit_in_memory() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut companies = context
        .collection("Company")
        .sort("Name", SortDirection::Ascending)
        .sort("NonExistentColumn", SortDirection::Descending)
        .range(0, 3);
    assert_eq!(names(&companies.to_vec().await.unwrap()), vec!["Acme", "Globex", "Hooli"]);
    let cursor = companies.cursor().await.unwrap();
    assert_eq!(cursor.backend_count(), 6);
    assert_eq!(cursor.count(), 3);

    let statements = repository.statements();
    let select = selects(&statements)[0];
    assert!(!select.contains("ORDER BY"), "{}", select);
    assert!(!select.contains("LIMIT"), "{}", select);
}

#[tokio::test]
async fn test_unpushable_filter_keeps_limit_in_memory() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut companies = context
        .collection("Company")
        .filter(Filter::full_text("Name", "globex"))
        .sort("Name", SortDirection::Ascending)
        .range(0, 1);
    assert_eq!(names(&companies.to_vec().await.unwrap()), vec!["Globex"]);

    let statements = repository.statements();
    let select = selects(&statements)[0];
    assert!(select.contains("ORDER BY"), "{}", select);
    assert!(!select.contains("LIMIT"), "{}", select);
}

#[tokio::test]
async fn test_rewind_reuses_fetched_result() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    repository.cache().clear();
    let mut companies = context.collection("Company").filter(Filter::greater_than("Balance", 15));
    let first = names(&companies.to_vec().await.unwrap());
    let executed = repository.statements().len();
    assert!(executed >= 1);

    companies.rewind().await.unwrap();
    let mut again = Vec::new();
    while let Some(record) = companies.next().await.unwrap() {
        again.push(record);
    }
    assert_eq!(names(&again), first);
    assert_eq!(companies.count().await.unwrap(), first.len());
    assert_eq!(repository.statements().len(), executed);

    companies.add_filter(filter!("Region", "south"));
    assert_eq!(companies.count().await.unwrap(), 2);
    assert!(repository.statements().len() > executed);
}

#[tokio::test]
async fn test_hydration_batches_uncached_rows() {
    let (context, repository) = sqlite_context(RepositoryConfig {
        hydrate_batch_size: 4,
        ..RepositoryConfig::default()
    })
    .await;
    repository.cache().clear();
    let mut companies = context.collection("Company").sort("CompanyID", SortDirection::Ascending);
    assert_eq!(companies.to_vec().await.unwrap().len(), 6);
    let hydrations = repository
        .statements()
        .iter()
        .filter(|sql| sql.starts_with("SELECT * FROM"))
        .count();
    assert_eq!(hydrations, 2);
}

#[tokio::test]
async fn test_native_batch_update_is_one_statement() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut rich = context
        .collection("Company")
        .filter(Filter::greater_than("Balance", 25))
        .filter(filter!("Contacts.Name", "Eve"));
    let mut values = Row::new();
    values.insert("Region".into(), Value::Text("west".into()));

    assert_eq!(rich.batch_update(values, false).await.unwrap(), 1);
    let updates: Vec<String> = repository
        .statements()
        .into_iter()
        .filter(|sql| sql.starts_with("UPDATE"))
        .collect();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains("IN (SELECT"), "{}", updates[0]);

    let hooli = context.load("Company", 5i64).await.unwrap();
    assert_eq!(hooli.get("Region"), Value::Text("west".into()));
    let globex = context.load("Company", 2i64).await.unwrap();
    assert_eq!(globex.get("Region"), Value::Text("south".into()));
}

#[tokio::test]
async fn test_infeasible_batch_writes_nothing() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut companies = context
        .collection("Company")
        .filter(Filter::full_text("Name", "acme"));
    let mut values = Row::new();
    values.insert("Balance".into(), Value::Int(0));

    let result = companies.batch_update(values.clone(), false).await;
    assert!(matches!(result, Err(Error::InfeasibleBatch(_))), "{:?}", result);
    let result = companies.batch_delete(false).await;
    assert!(matches!(result, Err(Error::InfeasibleBatch(_))), "{:?}", result);
    assert!(
        !repository
            .statements()
            .iter()
            .any(|sql| sql.starts_with("UPDATE") || sql.starts_with("DELETE") || sql.starts_with("INSERT"))
    );
    assert_eq!(context.load("Company", 1i64).await.unwrap().get("Balance"), Value::Int(10));

    let mut ranged = context.collection("Company").range(0, 2);
    assert!(matches!(
        ranged.batch_delete(false).await,
        Err(Error::InfeasibleBatch(_))
    ));

    assert_eq!(companies.batch_update(values, true).await.unwrap(), 1);
    assert_eq!(context.load("Company", 1i64).await.unwrap().get("Balance"), Value::Int(0));
}

#[tokio::test]
async fn test_native_batch_delete() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut east = context.collection("Company").filter(filter!("Region", "east"));
    assert_eq!(east.batch_delete(false).await.unwrap(), 1);
    assert_eq!(east.count().await.unwrap(), 0);
    assert_eq!(context.collection("Company").count().await.unwrap(), 5);
    assert_eq!(
        repository
            .statements()
            .iter()
            .filter(|sql| sql.starts_with("DELETE"))
            .count(),
        1
    );
    assert!(matches!(
        context.load("Company", 6i64).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_native_aggregate_column_groups_by_id() {
    let (context, repository) = sqlite_context(RepositoryConfig::default()).await;
    let mut companies = context
        .collection("Company")
        .aggregate_column(hyle::Aggregate::sum("Contacts.ContactID"))
        .filter(Filter::greater_than("SumOfContactsContactID", 4))
        .sort("Name", SortDirection::Ascending);
    let records = companies.to_vec().await.unwrap();
    assert_eq!(names(&records), vec!["Acme", "Hooli"]);
    assert_eq!(records[0].get("SumOfContactsContactID"), Value::Int(6));

    let statements = repository.statements();
    let select = selects(&statements)[0];
    assert!(select.contains("LEFT JOIN"), "{}", select);
    assert!(select.contains("GROUP BY"), "{}", select);
    assert!(select.contains("HAVING"), "{}", select);
}

#[tokio::test]
async fn test_push_down_disabled_sends_plain_select() {
    let (context, repository) = sqlite_context(RepositoryConfig::without_push_down()).await;
    let mut companies = context
        .collection("Company")
        .filter(filter!("Region", "north"))
        .sort("Name", SortDirection::Descending)
        .range(0, 1);
    assert_eq!(names(&companies.to_vec().await.unwrap()), vec!["Initech"]);

    let statements = repository.statements();
    let select = selects(&statements)[0];
    assert!(!select.contains("WHERE"), "{}", select);
    assert!(!select.contains("ORDER BY"), "{}", select);
}

#[tokio::test]
async fn test_statement_log_is_opt_in_and_bounded() {
    let quiet = Arc::new(SqliteRepository::connect(SqliteConfig::memory()).await.unwrap());
    let context = Context::with_repository(schemas(), quiet.clone());
    seed(&context).await;
    let mut companies = context.collection("Company");
    assert_eq!(companies.count().await.unwrap(), 6);
    assert!(quiet.statements().is_empty());

    let (context, repository) = sqlite_context(RepositoryConfig {
        statement_log_size: 2,
        ..RepositoryConfig::default()
    })
    .await;
    for name in ["Acme", "Globex", "Hooli"] {
        let mut companies = context.collection("Company").filter(filter!("Name", name));
        companies.ids().await.unwrap();
    }
    assert_eq!(repository.statements().len(), 2);
}

#[tokio::test]
async fn test_memory_database_outlives_idle_connections() {
    let repository = SqliteRepository::connect(SqliteConfig::memory()).await.unwrap();
    let options = repository.pool().options();
    assert_eq!(options.get_idle_timeout(), None);
    assert_eq!(options.get_max_lifetime(), None);
    assert_eq!(options.get_min_connections(), 1);
    assert_eq!(options.get_max_connections(), 1);
}
