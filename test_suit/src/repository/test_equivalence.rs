//! The same collection must yield the same records on every backend,
//! whatever share of it was pushed down.

use chrono::Weekday;
use hyle::{Aggregate, Collection, Context, Filter, Intersection, Model, SortDirection, Value, filter};

use super::*;

async fn ids(context: &Context, build: impl Fn(&Context) -> Collection) -> Vec<Value> {
    let mut collection = build(context).sort("CompanyID", SortDirection::Ascending);
    collection.ids().await.unwrap()
}

async fn assert_equivalent(build: impl Fn(&Context) -> Collection, expected: &[i64]) {
    let expected: Vec<Value> = expected.iter().map(|id| Value::Int(*id)).collect();
    for (backend, context) in all_contexts().await {
        assert_eq!(ids(&context, &build).await, expected, "backend: {}", backend);
    }
}

#[tokio::test]
async fn test_comparisons() {
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::greater_than("Balance", 20)),
        &[2, 4, 5],
    )
    .await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::less_than_or_equal("Balance", 20)),
        &[1, 3, 6],
    )
    .await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::between("Balance", 20, 40)),
        &[2, 3, 5, 6],
    )
    .await;
}

#[tokio::test]
async fn test_text_matching() {
    assert_equivalent(|c| c.collection("Company").filter(Filter::contains("Name", "OO")), &[5]).await;
    assert_equivalent(|c| c.collection("Company").filter(Filter::starts_with("Name", "g")), &[2]).await;
    assert_equivalent(|c| c.collection("Company").filter(Filter::ends_with("Name", "ch")), &[3]).await;
    // `%` and `_` are matched literally.
    assert_equivalent(|c| c.collection("Company").filter(Filter::contains("Name", "%")), &[]).await;
}

#[tokio::test]
async fn test_nulls_and_negation() {
    assert_equivalent(|c| c.collection("Company").filter(hyle::is_null_filter("Region")), &[4]).await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::not(filter!("Region", "north"))),
        &[2, 4, 5, 6],
    )
    .await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::one_of("Region", vec!["north", "east"])),
        &[1, 3, 6],
    )
    .await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::one_of::<&str>("Region", vec![])),
        &[],
    )
    .await;
}

#[tokio::test]
async fn test_lists_and_dates() {
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::list_contains("Tags", "retail")),
        &[1, 4],
    )
    .await;
    // 2024-01-01 was a Monday.
    assert_equivalent(
        |c| {
            c.collection("Company")
                .filter(Filter::day_of_week("Founded", vec![Weekday::Sat, Weekday::Sun]))
        },
        &[4, 5],
    )
    .await;
    assert_equivalent(
        |c| c.collection("Company").filter(Filter::day_of_week("Founded", vec![])),
        &[],
    )
    .await;
}

#[tokio::test]
async fn test_literals_and_composition() {
    assert_equivalent(|c| c.collection("Company").filter(Filter::literal(false)), &[]).await;
    assert_equivalent(
        |c| {
            c.collection("Company").filter(Filter::or(vec![
                filter!("Name", "Acme"),
                Filter::and(vec![
                    filter!("Region", "south"),
                    Filter::greater_than("Balance", 35),
                ]),
            ]))
        },
        &[1, 5],
    )
    .await;
    assert_equivalent(|c| c.collection("Company").filter(Filter::or(vec![])), &[]).await;
    assert_equivalent(|c| c.collection("Company").filter(Filter::and(vec![])), &[1, 2, 3, 4, 5, 6]).await;
}

#[tokio::test]
async fn test_relationship_paths() {
    assert_equivalent(
        |c| c.collection("Company").filter(filter!("Contacts.Name", "Dee")),
        &[2],
    )
    .await;
    assert_equivalent(
        |c| {
            c.collection("Company")
                .filter(Filter::starts_with("Contacts.Name", "A"))
                .filter(Filter::less_than("Contacts.Name", "C"))
        },
        &[1],
    )
    .await;
}

#[tokio::test]
async fn test_to_one_path_on_contacts() {
    for (backend, context) in all_contexts().await {
        let mut contacts = context
            .collection("Contact")
            .filter(filter!("Company.Region", "south"))
            .sort("ContactID", SortDirection::Ascending);
        assert_eq!(
            contacts.ids().await.unwrap(),
            vec![Value::Int(4), Value::Int(5)],
            "backend: {}",
            backend
        );
    }
}

#[tokio::test]
async fn test_sorted_ranges() {
    for (backend, context) in all_contexts().await {
        let mut companies = context
            .collection("Company")
            .sort("Balance", SortDirection::Descending)
            .sort("Name", SortDirection::Ascending)
            .range(1, 3);
        let records = companies.to_vec().await.unwrap();
        assert_eq!(names(&records), vec!["Hooli", "Globex", "Initech"], "backend: {}", backend);
    }
}

#[tokio::test]
async fn test_aggregate_columns() {
    for (backend, context) in all_contexts().await {
        let mut companies = context
            .collection("Company")
            .aggregate_column(Aggregate::count("Contacts.ContactID").with_alias("ContactCount"))
            .filter(Filter::greater_than("ContactCount", 0))
            .sort("ContactCount", SortDirection::Descending)
            .sort("Name", SortDirection::Ascending);
        let records = companies.to_vec().await.unwrap();
        assert_eq!(names(&records), vec!["Acme", "Globex", "Hooli"], "backend: {}", backend);
        let counts: Vec<Value> = records.iter().map(|r| r.get("ContactCount")).collect();
        assert_eq!(counts, vec![Value::Int(3), Value::Int(1), Value::Int(1)], "backend: {}", backend);
    }
}

#[tokio::test]
async fn test_scalar_aggregates() {
    for (backend, context) in all_contexts().await {
        let companies = context
            .collection("Company")
            .filter(filter!("Region", "north"))
            .range(0, 1);
        let results = companies
            .calculate_aggregates(vec![
                Aggregate::sum("Balance"),
                Aggregate::average("Balance"),
                Aggregate::max("Name"),
                Aggregate::count("Region"),
                Aggregate::count_distinct("Region"),
            ])
            .await
            .unwrap();
        assert_eq!(results.get("SumOfBalance"), Some(&Value::Int(30)), "backend: {}", backend);
        assert_eq!(results.get("AverageOfBalance"), Some(&Value::Float(15.0)), "backend: {}", backend);
        assert_eq!(results.get("MaxOfName"), Some(&Value::Text("Initech".into())), "backend: {}", backend);
        assert_eq!(results.get("CountOfRegion"), Some(&Value::Int(2)), "backend: {}", backend);
        assert_eq!(
            results.get("DistinctCountOfRegion"),
            Some(&Value::Int(1)),
            "backend: {}",
            backend
        );
    }
}

#[tokio::test]
async fn test_fan_out_and_distinct() {
    for (backend, context) in all_contexts().await {
        let pull = |context: &Context| {
            context
                .collection("Company")
                .filter(filter!("Name", "Acme"))
                .intersect_with(
                    Intersection::new(context.collection("Contact"), "CompanyID", "CompanyID")
                        .pull("Name", "ContactName"),
                )
        };
        let mut fanned = pull(&context);
        assert_eq!(fanned.count().await.unwrap(), 3, "backend: {}", backend);
        let mut pulled: Vec<Value> = fanned
            .to_vec()
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("ContactName"))
            .collect();
        pulled.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            pulled,
            vec![Value::Text("Ann".into()), Value::Text("Bob".into()), Value::Text("Cid".into())],
            "backend: {}",
            backend
        );

        let mut folded = pull(&context).distinct();
        assert_eq!(folded.count().await.unwrap(), 1, "backend: {}", backend);
        assert_eq!(folded.ids().await.unwrap(), vec![Value::Int(1)], "backend: {}", backend);
    }
}

#[tokio::test]
async fn test_left_intersection_keeps_unmatched() {
    for (backend, context) in all_contexts().await {
        let mut companies = context
            .collection("Company")
            .filter(Filter::one_of("Name", vec!["Globex", "Initech"]))
            .intersect_with(
                Intersection::new(context.collection("Contact"), "CompanyID", "CompanyID")
                    .pull("Name", "ContactName")
                    .left(),
            )
            .sort("Name", SortDirection::Ascending);
        let records = companies.to_vec().await.unwrap();
        assert_eq!(names(&records), vec!["Globex", "Initech"], "backend: {}", backend);
        assert_eq!(records[0].get("ContactName"), Value::Text("Dee".into()), "backend: {}", backend);
        assert_eq!(records[1].get("ContactName"), Value::Null, "backend: {}", backend);
    }
}

#[tokio::test]
async fn test_and_or_monotonicity() {
    let pairs = [
        (Filter::greater_than("Balance", 15), filter!("Region", "north")),
        (Filter::contains("Name", "e"), Filter::list_contains("Tags", "tools")),
        (
            Filter::between("Balance", 10, 30),
            Filter::not(hyle::is_null_filter("Region")),
        ),
    ];
    for (backend, context) in all_contexts().await {
        for (a, b) in pairs.iter() {
            let count = |filter: Filter| {
                let mut collection = context.collection("Company").filter(filter);
                async move { collection.count().await.unwrap() }
            };
            let alone = count(a.clone()).await;
            let both = count(Filter::and(vec![a.clone(), b.clone()])).await;
            let either = count(Filter::or(vec![a.clone(), b.clone()])).await;
            assert!(both <= alone, "backend: {}", backend);
            assert!(either >= alone, "backend: {}", backend);
        }
    }
}

#[tokio::test]
async fn test_filtering_twice_changes_nothing() {
    for (backend, context) in all_contexts().await {
        let filter = Filter::or(vec![filter!("Region", "south"), Filter::less_than("Balance", 15)]);
        let mut once = context.collection("Company").filter(filter.clone());
        let mut twice = context.collection("Company").filter(filter.clone()).filter(filter);
        assert_eq!(
            once.ids().await.unwrap(),
            twice.ids().await.unwrap(),
            "backend: {}",
            backend
        );
    }
}

/// Every backend plus one extra company saved into it.
async fn contexts_with(name: &str, balance: i64, region: &str) -> Vec<(&'static str, Context)> {
    let contexts = all_contexts().await;
    for (_, context) in &contexts {
        let mut company = context
            .record("Company")
            .unwrap()
            .with("Name", name)
            .with("Balance", balance)
            .with("Region", region);
        context.save(&mut company).await.unwrap();
    }
    contexts
}

#[tokio::test]
async fn test_mixed_type_comparisons_follow_column_affinity() {
    let cases: Vec<(Filter, Vec<i64>)> = vec![
        // Text column: numbers are compared as their text.
        (Filter::greater_than("Region", 9), vec![1, 2, 3, 5, 6]),
        (filter!("Region", 10.0), vec![]),
        (filter!("Region", 10), vec![7]),
        (Filter::one_of("Region", vec![10, 11]), vec![7]),
        // Integer column: numeric text is converted, other text sorts above numbers.
        (filter!("Balance", "60"), vec![7]),
        (Filter::greater_than("Balance", "45"), vec![4, 7]),
        (Filter::less_than("Balance", "abc"), vec![1, 2, 3, 4, 5, 6, 7]),
    ];
    for (backend, context) in contexts_with("Numbers", 60, "10").await {
        for (filter, expected) in &cases {
            let expected: Vec<Value> = expected.iter().map(|id| Value::Int(*id)).collect();
            let found = ids(&context, |c| c.collection("Company").filter(filter.clone())).await;
            assert_eq!(found, expected, "backend: {}, filter: {:?}", backend, filter);
        }
    }
}

#[tokio::test]
async fn test_integer_sum_overflow_fails_everywhere() {
    for (backend, context) in contexts_with("Huge", i64::MAX, "west").await {
        let companies = context.collection("Company");
        let sums = companies.calculate_aggregates(vec![Aggregate::sum("Balance")]).await;
        assert!(sums.is_err(), "backend: {}", backend);

        let averages = companies
            .calculate_aggregates(vec![Aggregate::average("Balance")])
            .await;
        assert!(averages.is_ok(), "backend: {}", backend);

        let capped = context
            .collection("Company")
            .filter(Filter::less_than("Balance", 100));
        let sums = capped.calculate_aggregates(vec![Aggregate::sum("Balance")]).await.unwrap();
        assert_eq!(sums.get("SumOfBalance"), Some(&Value::Int(170)), "backend: {}", backend);
    }
}
