//! Units of work bound to a single pooled connection.
//!
//! A `TransactionContext` owns the transaction for exactly one call to
//! [`TransactionCoordinator::execute_in_transaction`]. Every statement issued
//! through it runs on that transaction's connection, and the connection goes
//! back to the pool when the transaction is committed or rolled back.

use crate::db::executor::{self, ConnRef};
use crate::db::pool::ConnectionPool;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{DatabaseType, QueryParam, QueryResult};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Borrow the connection this transaction is pinned to.
    pub fn as_conn(&mut self) -> ConnRef<'_> {
        match self {
            DbTransaction::MySql(tx) => ConnRef::MySql(&mut **tx),
            DbTransaction::Postgres(tx) => ConnRef::Postgres(&mut **tx),
            DbTransaction::SQLite(tx) => ConnRef::SQLite(&mut **tx),
        }
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await,
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::SQLite(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await,
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::SQLite(tx) => tx.rollback().await,
        }
    }
}

/// The handle a unit of work uses to issue statements.
pub struct TransactionContext {
    id: String,
    tx: DbTransaction,
    started_at: DateTime<Utc>,
}

impl TransactionContext {
    fn new(tx: DbTransaction) -> Self {
        Self {
            id: generate_transaction_id(),
            tx,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn db_type(&self) -> DatabaseType {
        self.tx.db_type()
    }

    /// Run a statement inside the transaction and return the affected row count.
    pub async fn execute_update(&mut self, sql: &str, params: &[QueryParam]) -> ProviderResult<u64> {
        let rows_affected = executor::execute(self.tx.as_conn(), sql, params).await?;
        debug!(
            transaction_id = %self.id,
            sql = %sql,
            rows_affected,
            "Executed in transaction"
        );
        Ok(rows_affected)
    }

    /// Run a query inside the transaction. Results are never cached.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> ProviderResult<QueryResult> {
        executor::fetch(self.tx.as_conn(), sql, params).await
    }

    /// Batch insert whose rows commit or roll back together with the rest of the unit of work.
    pub async fn execute_batch_insert(
        &mut self,
        sql: &str,
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        executor::execute_batch(self.tx.as_conn(), sql, rows).await
    }

    /// Multi-row insert that commits or rolls back with the unit of work.
    pub async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        executor::insert_rows(self.tx.as_conn(), table, columns, rows).await
    }
}

/// Runs units of work with commit-or-rollback semantics.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    pool: Arc<ConnectionPool>,
}

impl TransactionCoordinator {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Execute `work` on one dedicated connection.
    ///
    /// Commits when `work` returns `Ok`. When it returns `Err` or panics, the
    /// transaction is rolled back and the error (or panic) is passed on
    /// unchanged. Nested calls from inside `work` are not supported.
    ///
    /// ```ignore
    /// let n = coordinator
    ///     .execute_in_transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute_update("DELETE FROM t", &[]).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute_in_transaction<T, F>(&self, work: F) -> ProviderResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut TransactionContext) -> BoxFuture<'c, ProviderResult<T>> + Send,
    {
        let tx = self.pool.begin("execute_in_transaction").await?;
        let mut ctx = TransactionContext::new(tx);
        let start = Instant::now();
        info!(transaction_id = %ctx.id, db_type = %ctx.db_type(), "Transaction started");

        let outcome = AssertUnwindSafe(work(&mut ctx)).catch_unwind().await;
        let TransactionContext { id, tx, .. } = ctx;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(|e| {
                    ProviderError::transaction(format!("Commit failed: {}", e), &id)
                })?;
                info!(
                    transaction_id = %id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(transaction_id = %id, error = %rollback_err, "Rollback failed");
                    return Err(ProviderError::transaction(
                        format!("{}; rollback failed: {}", err, rollback_err),
                        &id,
                    ));
                }
                warn!(transaction_id = %id, error = %err, "Transaction rolled back");
                Err(err)
            }
            Err(panic) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(transaction_id = %id, error = %rollback_err, "Rollback after panic failed");
                } else {
                    warn!(transaction_id = %id, "Transaction rolled back after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use tempfile::NamedTempFile;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32); // "tx_" + 32 hex chars
    }

    async fn setup() -> (NamedTempFile, Arc<ConnectionPool>) {
        let file = NamedTempFile::new().unwrap();
        let url = format!("sqlite:{}", file.path().display());
        let pool = ConnectionPool::connect(&url, DatabaseType::SQLite, None, &PoolOptions::default())
            .await
            .unwrap();
        let mut conn = pool.acquire("setup").await.unwrap();
        executor::execute(
            conn.as_conn(),
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
            &[],
        )
        .await
        .unwrap();
        pool.release(conn).await;
        (file, Arc::new(pool))
    }

    async fn count_rows(pool: &ConnectionPool) -> i64 {
        let mut conn = pool.acquire("count").await.unwrap();
        let result = executor::fetch(conn.as_conn(), "SELECT COUNT(*) AS n FROM t", &[])
            .await
            .unwrap();
        result.scalar().and_then(|v| v.as_i64()).unwrap()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let inserted = coordinator
            .execute_in_transaction(|tx| {
                Box::pin(async move {
                    let rows = vec![
                        vec![QueryParam::Int(1), QueryParam::from("a")],
                        vec![QueryParam::Int(2), QueryParam::from("b")],
                    ];
                    tx.execute_batch_insert("INSERT INTO t (id, name) VALUES (?, ?)", &rows)
                        .await
                })
            })
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(count_rows(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_insert_rows_rolls_back_with_unit_of_work() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let err = coordinator
            .execute_in_transaction(|tx| {
                Box::pin(async move {
                    let rows = vec![
                        vec![QueryParam::Int(1), QueryParam::from("a")],
                        vec![QueryParam::Int(2), QueryParam::from("b")],
                    ];
                    assert_eq!(tx.insert_rows("t", &["id", "name"], &rows).await?, 2);
                    // Duplicate primary key fails the whole statement
                    tx.insert_rows("t", &["id", "name"], &rows).await
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::DuplicateKey { ref operation, .. } if operation == "insert_rows"
        ));
        assert_eq!(count_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_rollback_returns_original_error() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let err = coordinator
            .execute_in_transaction(|tx| {
                Box::pin(async move {
                    tx.execute_update("INSERT INTO t (id, name) VALUES (1, 'a')", &[])
                        .await?;
                    Err::<(), _>(ProviderError::configuration("stop here"))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Configuration { ref message } if message == "stop here"));
        assert_eq!(count_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_backend_error_rolls_back_earlier_statements() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let err = coordinator
            .execute_in_transaction(|tx| {
                Box::pin(async move {
                    tx.execute_update("INSERT INTO t (id, name) VALUES (1, 'a')", &[])
                        .await?;
                    tx.execute_update("INSERT INTO missing (id) VALUES (1)", &[])
                        .await
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::BackendExecution { .. }));
        assert_eq!(count_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_panic_rolls_back() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let handle = tokio::spawn(async move {
            coordinator
                .execute_in_transaction(|tx| {
                    Box::pin(async move {
                        tx.execute_update("INSERT INTO t (id, name) VALUES (1, 'a')", &[])
                            .await?;
                        let explode = true;
                        if explode {
                            panic!("unit of work exploded");
                        }
                        Ok(())
                    })
                })
                .await
        });

        let join = handle.await;
        assert!(join.unwrap_err().is_panic());
        assert_eq!(count_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_query_sees_uncommitted_writes() {
        let (_file, pool) = setup().await;
        let coordinator = TransactionCoordinator::new(Arc::clone(&pool));

        let seen = coordinator
            .execute_in_transaction(|tx| {
                Box::pin(async move {
                    assert!(tx.id().starts_with("tx_"));
                    tx.execute_update(
                        "INSERT INTO t (id, name) VALUES (?, ?)",
                        &[QueryParam::Int(7), QueryParam::from("seven")],
                    )
                    .await?;
                    let result = tx.query("SELECT name FROM t WHERE id = 7", &[]).await?;
                    Ok(result.scalar().cloned())
                })
            })
            .await
            .unwrap();

        assert_eq!(seen, Some(serde_json::json!("seven")));
    }
}
