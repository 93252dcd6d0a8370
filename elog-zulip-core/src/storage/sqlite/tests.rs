use std::env::temp_dir;

use uuid::Uuid;

use super::*;

/// Create a temporary database for testing.
async fn create_test_store(table: &str) -> (SqliteStore, String) {
    let db_path = temp_dir().join(format!("elog_zulip_test_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}", db_path.display());
    let store = SqliteStore::new(&url, table)
        .await
        .expect("failed to create test store");
    (store, url)
}

fn record(id: i64, author: &str) -> PublishedRecord {
    PublishedRecord {
        entry_id: id,
        entry_date: format!("day {}", id),
        entry_author: author.to_string(),
    }
}

#[test]
fn test_database_path() {
    assert_eq!(database_path("sqlite:///published.db"), "published.db");
    assert_eq!(database_path("sqlite:////var/lib/published.db"), "/var/lib/published.db");
    assert_eq!(database_path("sqlite://published.db"), "published.db");
    assert_eq!(database_path("sqlite:/tmp/published.db"), "/tmp/published.db");
    assert_eq!(database_path("/tmp/published.db"), "/tmp/published.db");
}

#[test]
fn test_validate_table_name() {
    assert!(validate_table_name("operation").is_ok());
    assert!(validate_table_name("_doc_2024").is_ok());
    assert!(matches!(validate_table_name(""), Err(StorageError::InvalidTable(_))));
    assert!(matches!(validate_table_name("2doc"), Err(StorageError::InvalidTable(_))));
    assert!(matches!(
        validate_table_name("x\"; DROP TABLE y; --"),
        Err(StorageError::InvalidTable(_))
    ));
}

#[tokio::test]
async fn test_insert_and_find_ordered() {
    let (store, _) = create_test_store("operation").await;

    store.insert(&record(12, "Ada")).await.expect("insert failed");
    store.insert(&record(3, "Grace")).await.expect("insert failed");
    store.insert(&record(7, "Linus")).await.expect("insert failed");

    let records = store.find_ordered().await.expect("find failed");
    let ids: Vec<i64> = records.iter().map(|r| r.entry_id).collect();
    assert_eq!(ids, vec![3, 7, 12]);
    assert_eq!(records[0], record(3, "Grace"));
}

#[tokio::test]
async fn test_duplicate_insert_is_ignored() {
    let (store, _) = create_test_store("doc").await;

    store.insert(&record(1, "Ada")).await.expect("insert failed");
    store.insert(&record(1, "Someone else")).await.expect("insert failed");

    let records = store.find_ordered().await.expect("find failed");
    assert_eq!(records, vec![record(1, "Ada")]);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let (store, url) = create_test_store("xo").await;
    store.insert(&record(42, "Ada")).await.expect("insert failed");
    drop(store);

    let reopened = SqliteStore::new(&url, "xo").await.expect("reopen failed");
    let records = reopened.find_ordered().await.expect("find failed");
    assert_eq!(records, vec![record(42, "Ada")]);
}

#[tokio::test]
async fn test_tables_are_independent() {
    let (first, url) = create_test_store("first").await;
    let second = SqliteStore::new(&url, "second").await.expect("open failed");

    first.insert(&record(1, "Ada")).await.expect("insert failed");

    assert_eq!(first.find_ordered().await.unwrap().len(), 1);
    assert!(second.find_ordered().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_table_is_rejected() {
    let url = format!(
        "sqlite:{}",
        temp_dir().join(format!("elog_zulip_test_{}.db", Uuid::new_v4())).display()
    );
    let result = SqliteStore::new(&url, "bad name").await;
    assert!(matches!(result, Err(StorageError::InvalidTable(_))));
}

#[tokio::test]
async fn test_create_store() {
    let url = format!(
        "sqlite:{}",
        temp_dir().join(format!("elog_zulip_test_{}.db", Uuid::new_v4())).display()
    );
    let store = create_store(&url, "generic").await.expect("create failed");
    store.insert(&record(5, "Ada")).await.expect("insert failed");
    assert_eq!(store.find_ordered().await.unwrap().len(), 1);
}
