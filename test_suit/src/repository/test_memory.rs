use hyle::{Error, Filter, Model, Row, SortDirection, Value, filter};

use super::*;

#[tokio::test]
async fn test_rewind_runs_no_new_scan() {
    let (context, repository) = memory_context().await;
    let mut companies = context
        .collection("Company")
        .filter(filter!("Region", "north"))
        .sort("Name", SortDirection::Descending);
    assert_eq!(names(&companies.to_vec().await.unwrap()), vec!["Initech", "Acme"]);
    let scans = repository.executions();

    companies.rewind().await.unwrap();
    assert_eq!(companies.next().await.unwrap().map(|r| r.get("Name")), Some(Value::Text("Initech".into())));
    assert_eq!(companies.next().await.unwrap().map(|r| r.get("Name")), Some(Value::Text("Acme".into())));
    assert!(companies.next().await.unwrap().is_none());
    assert_eq!(repository.executions(), scans);

    companies.replace_filter(None);
    assert_eq!(companies.count().await.unwrap(), 6);
    assert_eq!(repository.executions(), scans + 1);
}

#[tokio::test]
async fn test_find_and_first() {
    let (context, _) = memory_context().await;
    let mut companies = context.collection("Company").sort("Balance", SortDirection::Ascending);
    assert_eq!(
        companies.first().await.unwrap().map(|r| r.get("Name")),
        Some(Value::Text("Acme".into()))
    );
    let stark = companies.find(&Value::Int(6)).await.unwrap().unwrap();
    assert_eq!(stark.get("Name"), Value::Text("Stark".into()));
    assert!(companies.find(&Value::Int(42)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batches_need_whole_table_or_fallback() {
    let (context, _) = memory_context().await;
    let mut south = context.collection("Company").filter(filter!("Region", "south"));
    let mut values = Row::new();
    values.insert("Balance".into(), Value::Int(1));

    assert!(matches!(
        south.batch_update(values.clone(), false).await,
        Err(Error::InfeasibleBatch(_))
    ));
    assert_eq!(context.load("Company", 2i64).await.unwrap().get("Balance"), Value::Int(30));

    assert_eq!(south.batch_update(values, true).await.unwrap(), 2);
    let mut ones = context.collection("Company").filter(filter!("Balance", 1));
    assert_eq!(ones.count().await.unwrap(), 2);

    assert_eq!(south.batch_delete(true).await.unwrap(), 2);
    assert_eq!(context.collection("Company").count().await.unwrap(), 4);

    let mut everything = context.collection("Contact");
    assert_eq!(everything.batch_delete(false).await.unwrap(), 5);
    assert_eq!(context.collection("Contact").count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_fallback_update_skips_duplicates() {
    let (context, _) = memory_context().await;
    let mut fanned = context
        .collection("Company")
        .filter(filter!("Name", "Acme"))
        .intersect_with(
            hyle::Intersection::new(context.collection("Contact"), "CompanyID", "CompanyID")
                .pull("Name", "ContactName"),
        );
    assert_eq!(fanned.count().await.unwrap(), 3);
    let mut values = Row::new();
    values.insert("Region".into(), Value::Text("west".into()));
    assert_eq!(fanned.batch_update(values, true).await.unwrap(), 1);

    let acme = context.load("Company", 1i64).await.unwrap();
    assert_eq!(acme.get("Region"), Value::Text("west".into()));
    assert!(!acme.data().contains_key("ContactName"));
}

#[tokio::test]
async fn test_sort_places_nulls_first() {
    let (context, _) = memory_context().await;
    let mut companies = context
        .collection("Company")
        .filter(Filter::greater_than("Balance", 0))
        .sort("Region", SortDirection::Ascending)
        .sort("Name", SortDirection::Ascending);
    // NULL sorts first.
    assert_eq!(
        names(&companies.to_vec().await.unwrap()),
        vec!["Umbrella", "Stark", "Acme", "Initech", "Globex", "Hooli"]
    );
}
