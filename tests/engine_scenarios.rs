// Engine behavior through the public API: ids, index/scan equivalence, paging, joins.
use serde_json::{Value, json};

use tabula::api::{
    Catalog, DataStore, Direction, Fields, IdMode, IndexDefinition, JoinConfig, JoinKind,
    MemoryStore, Operator, QueryOptions, Repository, Row, StoreOptions, WhereCondition,
};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("object")
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|row| row.id().to_string()).collect()
}

fn seeded(options: StoreOptions) -> MemoryStore {
    let mut store = MemoryStore::with_options("items", options);
    let statuses = ["active", "inactive", "trial", "active"];
    let regions = ["eu", "us"];
    for n in 0..40 {
        let mut row = fields(json!({
            "n": n,
            "status": statuses[n % statuses.len()],
            "region": regions[n % regions.len()],
            "score": (n * 7) % 11,
        }));
        if n % 5 == 0 {
            row.remove("score");
        }
        if n % 9 == 0 {
            row.insert("status".to_string(), Value::Null);
        }
        store.insert(row).expect("insert");
    }
    store
}

fn churn(store: &mut MemoryStore) {
    for id in [3_i64, 8, 21, 40] {
        store.delete(&id.into()).expect("delete");
    }
    for id in [2_i64, 5, 13] {
        store
            .update(&id.into(), fields(json!({"status": "trial", "score": 1.0})))
            .expect("update");
    }
    store
        .insert(fields(json!({"n": 100, "status": "active", "region": "eu"})))
        .expect("insert");
    store
        .insert(fields(json!({"n": 9_007_199_254_740_993_i64, "region": "us"})))
        .expect("insert");
}

#[test]
fn auto_ids_start_at_one() {
    let mut repo = Repository::new(MemoryStore::new("t"));
    let rows = repo
        .batch_insert(vec![
            fields(json!({"a": 1})),
            fields(json!({"a": 2})),
            fields(json!({"a": 3})),
        ])
        .expect("batch");
    assert_eq!(ids(&rows), ["1", "2", "3"]);
}

#[test]
fn client_ids_must_be_unique() {
    let mut store = MemoryStore::with_options("t", StoreOptions::new().with_id_mode(IdMode::Client));
    store.insert(fields(json!({"id": "a"}))).expect("insert");
    assert!(store.insert(fields(json!({"id": "a"}))).is_err());
    assert!(store.insert(fields(json!({"x": 1}))).is_err());
}

#[test]
fn index_and_scan_agree_after_churn() {
    let mut plain = seeded(StoreOptions::new());
    let mut indexed = seeded(
        StoreOptions::new()
            .with_index(IndexDefinition::new(["status"]))
            .with_index(IndexDefinition::new(["region"]))
            .with_index(IndexDefinition::new(["status", "region"]))
            .with_index(IndexDefinition::new(["n"])),
    );
    churn(&mut plain);
    churn(&mut indexed);

    let queries = vec![
        QueryOptions::new().with_condition(WhereCondition::eq("status", "active")),
        QueryOptions::new()
            .with_condition(WhereCondition::eq("status", "trial"))
            .with_condition(WhereCondition::eq("region", "us")),
        QueryOptions::new()
            .with_condition(WhereCondition::eq("status", Value::Null))
            .with_condition(WhereCondition::new("n", Operator::Gt, 10)),
        QueryOptions::new()
            .with_condition(WhereCondition::eq("region", "eu"))
            .with_condition(WhereCondition::eq("score", 1))
            .with_order(tabula::api::OrderBy::desc("n"))
            .with_limit(3),
        QueryOptions::new().with_condition(WhereCondition::eq("status", "missing")),
        QueryOptions::new().with_condition(WhereCondition::eq("n", 9_007_199_254_740_992_i64)),
        QueryOptions::new().with_condition(WhereCondition::eq("n", 9_007_199_254_740_993_i64)),
        QueryOptions::new().with_condition(WhereCondition::new(
            "n",
            Operator::In,
            json!([9_007_199_254_740_992_i64, 100]),
        )),
    ];
    for options in &queries {
        let expected = plain.find(options).expect("scan");
        let actual = indexed.find(options).expect("indexed");
        assert_eq!(ids(&actual), ids(&expected), "{options:?}");
    }
    assert!(indexed.find(&queries[5]).expect("indexed").is_empty());
    assert_eq!(indexed.find(&queries[6]).expect("indexed").len(), 1);
    assert_eq!(indexed.find(&queries[7]).expect("indexed").len(), 1);

    let plan = indexed.explain(&queries[1]).expect("explain");
    assert!(!plan.full_scan);
    assert!(plan.indexes_used.iter().any(|name| name == "status,region"));
}

#[test]
fn status_index_finds_active_rows() {
    let rows = json!([
        {"id": 1, "status": "active"},
        {"id": 2, "status": "inactive"},
        {"id": 3, "status": "active"}
    ]);
    let rows: Vec<Row> = rows
        .as_array()
        .unwrap()
        .iter()
        .cloned()
        .map(Row::from_value)
        .collect::<Result<_, _>>()
        .expect("rows");

    let plain = MemoryStore::from_rows("t", rows.clone(), StoreOptions::new()).expect("plain");
    let indexed = MemoryStore::from_rows(
        "t",
        rows,
        StoreOptions::new().with_index(IndexDefinition::new(["status"])),
    )
    .expect("indexed");
    let options = QueryOptions::new().with_condition(WhereCondition::eq("status", "active"));
    assert_eq!(ids(&plain.find(&options).unwrap()), ["1", "3"]);
    assert_eq!(ids(&indexed.find(&options).unwrap()), ["1", "3"]);
}

#[test]
fn page_matches_offset_and_limit() {
    let store = seeded(StoreOptions::new());
    let repo = Repository::new(store);
    let paged = repo.query().order_by("n", Direction::Asc).page(2, 10).exec().unwrap();
    let manual = repo
        .query()
        .order_by("n", Direction::Asc)
        .offset(10)
        .limit(10)
        .exec()
        .unwrap();
    assert_eq!(ids(&paged), ids(&manual));
    assert_eq!(ids(&paged).first().map(String::as_str), Some("11"));

    assert!(repo.query().limit(0).exec().unwrap().is_empty());
    assert_eq!(repo.query().limit(0).count().unwrap(), 40);
}

#[test]
fn aggregates_over_filtered_rows() {
    let repo = Repository::new(seeded(StoreOptions::new()));
    let active = repo.query().where_eq("status", "active");
    let count = active.count().unwrap();
    assert_eq!(count, active.exec().unwrap().len());
    assert!(active.sum("score").unwrap() >= 0.0);

    let none = repo.query().where_eq("status", "nope");
    assert_eq!(none.count().unwrap(), 0);
    assert_eq!(none.sum("score").unwrap(), 0.0);
    assert_eq!(none.avg("score").unwrap(), None);
    assert_eq!(none.min("score").unwrap(), None);
    assert_eq!(none.max("score").unwrap(), None);
}

#[test]
fn joins_batch_and_attach_by_alias() {
    let mut authors = MemoryStore::new("authors");
    authors.insert(fields(json!({"name": "ann"}))).unwrap();
    authors.insert(fields(json!({"name": "bob"}))).unwrap();
    let mut books = Repository::new(MemoryStore::new("books"));
    for (title, author) in [("a", json!(2)), ("b", json!(1)), ("c", Value::Null), ("d", json!(7))] {
        books
            .insert(fields(json!({"title": title, "author_id": author})))
            .unwrap();
    }
    let catalog = Catalog::new().with_table("authors", authors);

    let left = books
        .join_query(&catalog)
        .join_with(JoinConfig::new("authors", "author_id").alias("author"))
        .exec()
        .unwrap();
    assert_eq!(left.len(), 4);
    assert_eq!(left[0].get_path("author.name"), Some(&json!("bob")));
    assert_eq!(left[2].get("author"), Some(&Value::Null));

    let inner = books
        .join_query(&catalog)
        .join_with(
            JoinConfig::new("authors", "author_id")
                .alias("author")
                .kind(JoinKind::Inner),
        )
        .order_by("author.name", Direction::Asc);
    let rows = inner.exec().unwrap();
    let titles: Vec<&str> = rows
        .iter()
        .map(|row| row.get("title").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(titles, ["b", "a"]);
    assert_eq!(inner.count().unwrap(), rows.len());
}
