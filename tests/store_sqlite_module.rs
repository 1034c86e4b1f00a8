use serde_json::{json, Map, Value};
use skaigate::shared::ids::TableName;
use skaigate::store::{Datastore, Filter, SqliteStore};

fn open_store(dir: &std::path::Path) -> SqliteStore {
    let store = SqliteStore::open(&dir.join("store.db")).expect("open store");
    store.ensure_schema().expect("schema");
    store
}

fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn sqlite_module_insert_generates_an_id_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let table = TableName::parse("activities").expect("table");

    let outcome = store
        .insert(&table, &row(&[("name", json!("Site Prep"))]))
        .expect("insert");
    assert_eq!(outcome.records_affected, 1);
    let id = outcome.rows[0]
        .get("id")
        .and_then(Value::as_str)
        .expect("generated id");
    assert!(id.starts_with("rec-"));

    let explicit = store
        .insert(&table, &row(&[("id", json!("act-7")), ("name", json!("Pour"))]))
        .expect("insert with id");
    assert_eq!(explicit.rows[0].get("id").unwrap(), "act-7");
}

#[test]
fn sqlite_module_select_composes_eq_and_in_filters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let table = TableName::parse("tasks").expect("table");

    for (id, company, status) in [
        ("t-1", "co-1", "open"),
        ("t-2", "co-1", "done"),
        ("t-3", "co-2", "open"),
    ] {
        store
            .insert(
                &table,
                &row(&[
                    ("id", json!(id)),
                    ("company_id", json!(company)),
                    ("status", json!(status)),
                ]),
            )
            .expect("seed");
    }

    let open_in_scope = store
        .select(
            &table,
            &[
                Filter::eq("status", json!("open")),
                Filter::within("company_id", vec![json!("co-1"), json!("co-3")]),
            ],
        )
        .expect("select");
    assert_eq!(open_in_scope.records_affected, 1);
    assert_eq!(open_in_scope.rows[0].get("id").unwrap(), "t-1");

    let absent = store
        .select(&table, &[Filter::eq("missing_column", json!("x"))])
        .expect("select");
    assert_eq!(absent.records_affected, 0);
}

#[test]
fn sqlite_module_update_merges_into_matching_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let table = TableName::parse("activities").expect("table");

    store
        .insert(
            &table,
            &row(&[("id", json!("a-1")), ("name", json!("Prep")), ("cost_est", json!(100))]),
        )
        .expect("seed");

    let outcome = store
        .update(
            &table,
            &row(&[("cost_est", json!(250)), ("id", json!("ignored"))]),
            &[Filter::eq("id", json!("a-1"))],
        )
        .expect("update");
    assert_eq!(outcome.records_affected, 1);
    assert_eq!(outcome.rows[0].get("cost_est").unwrap(), &json!(250));
    assert_eq!(outcome.rows[0].get("id").unwrap(), "a-1");
    assert_eq!(outcome.rows[0].get("name").unwrap(), "Prep");
}

#[test]
fn sqlite_module_delete_removes_only_matching_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let table = TableName::parse("costs").expect("table");

    for id in ["c-1", "c-2", "c-3"] {
        store
            .insert(&table, &row(&[("id", json!(id)), ("kind", json!(id == "c-2"))]))
            .expect("seed");
    }

    let outcome = store
        .delete(&table, &[Filter::eq("id", json!("c-2"))])
        .expect("delete");
    assert_eq!(outcome.records_affected, 1);

    let remaining = store.select(&table, &[]).expect("select");
    assert_eq!(remaining.records_affected, 2);
}

#[test]
fn sqlite_module_tables_are_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let activities = TableName::parse("activities").expect("table");
    let tasks = TableName::parse("tasks").expect("table");

    store
        .insert(&activities, &row(&[("id", json!("x")), ("name", json!("A"))]))
        .expect("insert");
    let outcome = store.select(&tasks, &[]).expect("select");
    assert_eq!(outcome.records_affected, 0);
}
