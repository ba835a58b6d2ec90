//! Integration tests for the relational provider.
//!
//! Tests verify that:
//! - The file-backed end-to-end flow (create, batch insert, count, schema) works
//! - Units of work commit on success and leave the table unchanged on failure
//! - Pool exhaustion surfaces as an error after the acquire timeout
//! - Query results are served from the cache until invalidated
//! - A closed provider rejects operations and reports unhealthy
//!
//! PostgreSQL and MySQL variants run only when `TEST_POSTGRES_URL` /
//! `TEST_MYSQL_URL` are set.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use test_data_provider::config::PoolOptions;
use test_data_provider::error::ProviderError;
use test_data_provider::models::ProviderState;
use test_data_provider::{Provider, ProviderConfig, QueryParam};

/// Create a file-backed SQLite provider with table `t`.
async fn setup_provider(pool: PoolOptions) -> (NamedTempFile, Provider) {
    let file = NamedTempFile::new().unwrap();
    let provider = Provider::connect(ProviderConfig::sqlite(file.path()).with_pool(pool))
        .await
        .unwrap();
    provider
        .execute_update(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
            &[],
        )
        .await
        .unwrap();
    (file, provider)
}

fn rows(names: &[&str]) -> Vec<Vec<QueryParam>> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| vec![QueryParam::Int(i as i64 + 1), QueryParam::from(*name)])
        .collect()
}

async fn count_rows(provider: &Provider, query: &str) -> i64 {
    provider.invalidate_query(query).unwrap();
    let result = provider.execute_query(query).await.unwrap();
    result.scalar().and_then(|v| v.as_i64()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_file_backed() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    let inserted = provider
        .execute_batch_insert(
            "INSERT INTO t (id, name) VALUES (?, ?)",
            &rows(&["ada", "grace", "edsger"]),
        )
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let result = provider.execute_query("SELECT COUNT(*) FROM t").await.unwrap();
    assert_eq!(result.scalar().and_then(|v| v.as_i64()), Some(3));

    provider.clear_cache_for_table("t").await.unwrap();
    assert_eq!(
        provider.get_column_names("t").await.unwrap(),
        vec!["id".to_string(), "name".to_string()]
    );
    assert_eq!(provider.get_primary_keys("t").await.unwrap(), vec!["id".to_string()]);

    let tables: Vec<String> = provider
        .list_tables()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(tables.contains(&"t".to_string()));
    assert!(tables.contains(&"provider_records".to_string()));

    provider.close().await;
}

#[tokio::test]
async fn test_multi_row_insert_spans_bind_limit() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    // 40k bind values exceed SQLite's per-statement limit, forcing two statements
    let many: Vec<Vec<QueryParam>> = (1..=20_000)
        .map(|i| vec![QueryParam::Int(i), QueryParam::from(format!("user-{i}"))])
        .collect();
    let inserted = provider.insert_rows("t", &["id", "name"], &many).await.unwrap();
    assert_eq!(inserted, 20_000);
    assert_eq!(count_rows(&provider, "SELECT COUNT(*) FROM t").await, 20_000);

    let with_null = vec![vec![QueryParam::Int(20_001), QueryParam::Null]];
    assert_eq!(provider.insert_rows("t", &["id", "name"], &with_null).await.unwrap(), 1);
    assert_eq!(
        count_rows(&provider, "SELECT COUNT(*) FROM t WHERE name IS NULL").await,
        1
    );

    assert_eq!(provider.insert_rows("t", &["id", "name"], &[]).await.unwrap(), 0);
    let ragged = vec![vec![QueryParam::Int(1)]];
    let err = provider.insert_rows("t", &["id", "name"], &ragged).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::BackendExecution { ref operation, ref target, .. }
            if operation == "insert_rows" && target == "t"
    ));
}

#[tokio::test]
async fn test_missing_table_is_empty_not_error() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    assert!(provider.get_column_names("nonexistent_table").await.unwrap().is_empty());
    assert!(provider.get_foreign_keys("nonexistent_table").await.unwrap().is_empty());
    assert!(
        provider
            .get_column_data_types("nonexistent_table")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_batch_into_missing_table_commits_nothing() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    let err = provider
        .execute_batch_insert(
            "INSERT INTO missing (id, name) VALUES (?, ?)",
            &rows(&["a", "b"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::BackendExecution { .. }));
    assert_eq!(count_rows(&provider, "SELECT COUNT(*) FROM t").await, 0);
}

#[tokio::test]
async fn test_unit_of_work_commits() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    let affected = provider
        .execute_in_transaction(|tx| {
            Box::pin(async move {
                let batch = rows(&["a", "b"]);
                tx.execute_batch_insert("INSERT INTO t (id, name) VALUES (?, ?)", &batch)
                    .await?;
                tx.execute_update(
                    "UPDATE t SET name = ? WHERE id = ?",
                    &[QueryParam::from("z"), QueryParam::Int(1)],
                )
                .await
            })
        })
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(count_rows(&provider, "SELECT COUNT(*) FROM t").await, 2);
    let renamed = provider
        .execute_query("SELECT name FROM t WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(renamed.rows[0]["name"], json!("z"));
}

#[tokio::test]
async fn test_failed_unit_of_work_leaves_table_unchanged() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    let err = provider
        .execute_in_transaction(|tx| {
            Box::pin(async move {
                let batch = rows(&["a", "b"]);
                tx.execute_batch_insert("INSERT INTO t (id, name) VALUES (?, ?)", &batch)
                    .await?;
                // Duplicate primary key aborts the unit of work
                tx.execute_update(
                    "INSERT INTO t (id, name) VALUES (?, ?)",
                    &[QueryParam::Int(1), QueryParam::from("again")],
                )
                .await
            })
        })
        .await
        .unwrap_err();

    assert!(!matches!(err, ProviderError::Transaction { .. }));
    assert_eq!(count_rows(&provider, "SELECT COUNT(*) FROM t").await, 0);
    // The connection went back to the pool
    assert_eq!(provider.execute_update("DELETE FROM t", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pool_exhaustion_times_out() {
    let (_file, provider) = setup_provider(PoolOptions {
        max_connections: Some(1),
        min_connections: Some(1),
        acquire_timeout_secs: Some(1),
        ..Default::default()
    })
    .await;

    let holder = provider.execute_in_transaction(|tx| {
        Box::pin(async move {
            tx.execute_update("INSERT INTO t (id, name) VALUES (1, 'held')", &[])
                .await?;
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok(())
        })
    });
    let waiter = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        provider.execute_update("DELETE FROM t", &[]).await
    };

    let (held, waited) = tokio::join!(holder, waiter);
    held.unwrap();
    let err = waited.unwrap_err();
    assert!(matches!(err, ProviderError::PoolExhausted { timeout_ms: 1000, .. }));
    assert!(err.is_retryable());

    let stats = provider.pool_statistics().unwrap();
    assert_eq!(stats.max, 1);
    assert!(stats.timed_out >= 1);

    // Once released, the connection is usable again
    assert_eq!(count_rows(&provider, "SELECT COUNT(*) FROM t").await, 1);
}

#[tokio::test]
async fn test_query_results_cached_until_invalidated() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;
    let query = "SELECT COUNT(*) FROM t";

    let before = provider.execute_query(query).await.unwrap();
    provider
        .execute_update("INSERT INTO t (id, name) VALUES (1, 'a')", &[])
        .await
        .unwrap();

    // Writes do not invalidate cached query results
    let cached = provider.execute_query(query).await.unwrap();
    assert!(Arc::ptr_eq(&before, &cached));
    assert_eq!(cached.scalar().and_then(|v| v.as_i64()), Some(0));

    // Textually different query text is a separate entry
    let spaced = provider.execute_query("SELECT  COUNT(*) FROM t").await.unwrap();
    assert_eq!(spaced.scalar().and_then(|v| v.as_i64()), Some(1));

    provider.invalidate_query(query).unwrap();
    let fresh = provider.execute_query(query).await.unwrap();
    assert_eq!(fresh.scalar().and_then(|v| v.as_i64()), Some(1));
}

#[tokio::test]
async fn test_record_contract_on_record_table() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;

    provider.insert("fixture:1", json!({"name": "Ada"})).await.unwrap();
    assert!(matches!(
        provider.insert("fixture:1", json!({})).await,
        Err(ProviderError::DuplicateKey { .. })
    ));
    provider.upsert("fixture:1", json!({"name": "Grace"})).await.unwrap();
    assert_eq!(
        provider.get("fixture:1").await.unwrap(),
        Some(json!({"name": "Grace"}))
    );
    assert!(provider.exists("fixture:1").await.unwrap());
    assert!(!provider.expire("fixture:1", 60).await.unwrap());

    assert!(provider.delete("fixture:1").await.unwrap());
    assert!(!provider.delete("fixture:1").await.unwrap());
    assert_eq!(provider.get("fixture:1").await.unwrap(), None);
}

#[tokio::test]
async fn test_closed_provider() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;
    assert!(provider.is_healthy().await);
    assert!(provider.server_version().unwrap().is_some());

    provider.close().await;
    provider.close().await;

    assert_eq!(provider.state(), ProviderState::Closed);
    assert!(!provider.is_healthy().await);
    assert!(matches!(
        provider.execute_query("SELECT 1").await,
        Err(ProviderError::Closed { .. })
    ));
    assert!(matches!(
        provider.execute_update("DELETE FROM t", &[]).await,
        Err(ProviderError::Closed { .. })
    ));
    assert!(matches!(provider.server_version(), Err(ProviderError::Closed { .. })));
    assert!(matches!(
        provider.invalidate_query("SELECT 1"),
        Err(ProviderError::Closed { .. })
    ));
}

#[tokio::test]
async fn test_shared_across_tasks() {
    let (_file, provider) = setup_provider(PoolOptions::default()).await;
    let provider = Arc::new(provider);

    let mut handles = Vec::new();
    for i in 0..8 {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            provider
                .upsert(&format!("task:{}", i), json!({ "n": i }))
                .await
                .unwrap();
            provider.get(&format!("task:{}", i)).await.unwrap()
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Some(json!({ "n": i })));
    }
}

#[tokio::test]
async fn test_invalid_configuration_fails_fast() {
    let err = Provider::connect(ProviderConfig::sqlite("/tmp/a.db").with_pool(PoolOptions {
        max_connections: Some(0),
        ..Default::default()
    }))
    .await
    .unwrap_err();
    assert!(matches!(err, ProviderError::Configuration { .. }));
}

#[tokio::test]
async fn test_postgres_end_to_end() {
    let Ok(url) = std::env::var("TEST_POSTGRES_URL") else {
        return;
    };
    network_end_to_end(&url, "$1, $2").await;
}

#[tokio::test]
async fn test_mysql_end_to_end() {
    let Ok(url) = std::env::var("TEST_MYSQL_URL") else {
        return;
    };
    network_end_to_end(&url, "?, ?").await;
}

async fn network_end_to_end(url: &str, placeholders: &str) {
    let table = format!("provider_e2e_{}", std::process::id());
    let provider = Provider::connect(ProviderConfig::parse(url).unwrap())
        .await
        .unwrap();
    provider
        .execute_update(&format!("DROP TABLE IF EXISTS {}", table), &[])
        .await
        .unwrap();
    provider
        .execute_update(
            &format!("CREATE TABLE {} (id INTEGER PRIMARY KEY, name TEXT)", table),
            &[],
        )
        .await
        .unwrap();

    let inserted = provider
        .execute_batch_insert(
            &format!("INSERT INTO {} (id, name) VALUES ({})", table, placeholders),
            &rows(&["a", "b", "c"]),
        )
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    provider.clear_cache_for_table(&table).await.unwrap();
    assert_eq!(
        provider.get_column_names(&table).await.unwrap(),
        vec!["id".to_string(), "name".to_string()]
    );

    provider.upsert("e2e", json!({"ok": true})).await.unwrap();
    provider.upsert("e2e", json!({"ok": false})).await.unwrap();
    provider.invalidate_record("e2e").unwrap();
    assert_eq!(provider.get("e2e").await.unwrap(), Some(json!({"ok": false})));
    provider.delete("e2e").await.unwrap();

    provider
        .execute_update(&format!("DROP TABLE {}", table), &[])
        .await
        .unwrap();
    provider.close().await;
}
