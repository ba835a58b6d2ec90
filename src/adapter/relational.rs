//! Relational family adapter.
//!
//! The record contract maps onto a two-column table (`id`, `value` as JSON
//! text) created on connect if missing. Besides the uniform contract this
//! adapter owns the pool, the transaction coordinator and the schema
//! metadata service that relational-only provider operations go through.

use super::BackendAdapter;
use crate::config::ProviderConfig;
use crate::db::executor;
use crate::db::pool::{ConnectionPool, PoolStatistics, PooledConnection};
use crate::db::query_builder::{SqlDialect, build_paginated_query};
use crate::db::schema::SchemaMetadataService;
use crate::db::transaction::TransactionCoordinator;
use crate::error::{ProviderError, ProviderResult, ResultExt};
use crate::models::{BackendFamily, DatabaseType, QueryParam, QueryResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Statement text for the record table, rendered once per dialect.
#[derive(Debug, Clone)]
struct RecordStatements {
    create: String,
    insert: String,
    select: String,
    exists: String,
    upsert: String,
    delete: String,
}

impl RecordStatements {
    fn new(table: &str, db_type: DatabaseType) -> Self {
        let dialect = SqlDialect::from(db_type);
        let t = dialect.quote_identifier(table);
        let p1 = dialect.placeholder(1);
        let p2 = dialect.placeholder(2);
        // MySQL cannot index an unbounded TEXT key
        let id_type = match db_type {
            DatabaseType::MySQL => "VARCHAR(255)",
            _ => "TEXT",
        };
        let upsert = match db_type {
            DatabaseType::MySQL => format!(
                "INSERT INTO {t} (id, value) VALUES ({p1}, {p2}) ON DUPLICATE KEY UPDATE value = VALUES(value)"
            ),
            _ => format!(
                "INSERT INTO {t} (id, value) VALUES ({p1}, {p2}) ON CONFLICT (id) DO UPDATE SET value = excluded.value"
            ),
        };
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {t} (id {id_type} PRIMARY KEY, value TEXT NOT NULL)"
            ),
            insert: format!("INSERT INTO {t} (id, value) VALUES ({p1}, {p2})"),
            select: format!("SELECT value FROM {t} WHERE id = {p1}"),
            exists: format!("SELECT 1 AS present FROM {t} WHERE id = {p1}"),
            upsert,
            delete: format!("DELETE FROM {t} WHERE id = {p1}"),
        }
    }
}

pub struct RelationalAdapter {
    pool: Arc<ConnectionPool>,
    coordinator: TransactionCoordinator,
    schema: SchemaMetadataService,
    dialect: SqlDialect,
    statements: RecordStatements,
}

impl RelationalAdapter {
    /// Open the pool and make sure the record table exists.
    pub async fn connect(config: &ProviderConfig) -> ProviderResult<Self> {
        let db_type = config.database_type().ok_or_else(|| {
            ProviderError::configuration(format!(
                "Unsupported relational connection string: {}",
                config.masked_connection_string()
            ))
        })?;
        let pool = Arc::new(
            ConnectionPool::connect(
                &config.connection_string,
                db_type,
                config.credentials.as_ref(),
                &config.pool,
            )
            .await?,
        );

        // PostgreSQL catalogs are per-schema; MySQL falls back to DATABASE()
        let schema = match db_type {
            DatabaseType::MySQL => config.database.clone(),
            _ => None,
        };
        let adapter = Self {
            coordinator: TransactionCoordinator::new(Arc::clone(&pool)),
            schema: SchemaMetadataService::new(Arc::clone(&pool), schema),
            dialect: SqlDialect::from(db_type),
            statements: RecordStatements::new(&config.record_table, db_type),
            pool,
        };

        if let Err(e) = adapter.execute_update(&adapter.statements.create, &[]).await {
            adapter.pool.close().await;
            return Err(e);
        }
        info!(
            db_type = %db_type,
            record_table = %config.record_table,
            "Relational adapter ready"
        );
        Ok(adapter)
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn pool_statistics(&self) -> PoolStatistics {
        self.pool.statistics()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.pool.server_version()
    }

    pub fn transactions(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn schema(&self) -> &SchemaMetadataService {
        &self.schema
    }

    pub fn paginated_query(&self, base_query: &str, offset: u64, limit: u64) -> String {
        build_paginated_query(base_query, offset, limit, self.dialect)
    }

    /// DDL/DML outside a transaction (autocommit).
    pub async fn execute_update(&self, sql: &str, params: &[QueryParam]) -> ProviderResult<u64> {
        let mut conn = self.pool.acquire("execute_update").await?;
        let result = executor::execute(conn.as_conn(), sql, params).await;
        self.finish(conn, &result).await;
        result
    }

    /// Uncached parameterized query.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> ProviderResult<QueryResult> {
        let mut conn = self.pool.acquire("execute_query").await?;
        let result = executor::fetch(conn.as_conn(), sql, params).await;
        self.finish(conn, &result).await;
        result
    }

    /// Run one prepared statement for every row on a single connection.
    ///
    /// Not transactional: rows before a failing row stay written unless this
    /// is called through a transaction context.
    pub async fn execute_batch_insert(
        &self,
        sql: &str,
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.acquire("execute_batch_insert").await?;
        let result = executor::execute_batch(conn.as_conn(), sql, rows).await;
        self.finish(conn, &result).await;
        result
    }

    /// Multi-row insert into `table`; see [`executor::insert_rows`].
    pub async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.acquire("insert_rows").await?;
        let result = executor::insert_rows(conn.as_conn(), table, columns, rows).await;
        self.finish(conn, &result).await;
        result
    }

    /// Release a lease, discarding it if the statement failed at the transport level.
    async fn finish<T>(&self, mut conn: PooledConnection, result: &ProviderResult<T>) {
        if let Err(ProviderError::Connection { .. }) = result {
            conn.mark_invalid();
        }
        self.pool.release(conn).await;
    }

    fn decode_value(id: &str, result: &QueryResult) -> ProviderResult<Option<JsonValue>> {
        let Some(raw) = result.scalar() else {
            return Ok(None);
        };
        match raw {
            JsonValue::String(text) => serde_json::from_str(text).map(Some).map_err(|e| {
                ProviderError::backend("get", id, format!("Stored value is not JSON: {}", e), None)
            }),
            JsonValue::Null => Ok(None),
            // JSON-typed columns may already be decoded
            other => Ok(Some(other.clone())),
        }
    }
}

#[async_trait]
impl BackendAdapter for RelationalAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Relational
    }

    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        let params = [QueryParam::from(id), QueryParam::String(value.to_string())];
        self.execute_update(&self.statements.insert, &params)
            .await
            .context("insert", id)
            .map(|_| ())
    }

    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        let result = self
            .query(&self.statements.select, &[QueryParam::from(id)])
            .await
            .context("get", id)?;
        Self::decode_value(id, &result)
    }

    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        let params = [QueryParam::from(id), QueryParam::String(value.to_string())];
        self.execute_update(&self.statements.upsert, &params)
            .await
            .context("upsert", id)
            .map(|_| ())
    }

    async fn delete(&self, id: &str) -> ProviderResult<bool> {
        let affected = self
            .execute_update(&self.statements.delete, &[QueryParam::from(id)])
            .await
            .context("delete", id)?;
        Ok(affected > 0)
    }

    async fn exists(&self, id: &str) -> ProviderResult<bool> {
        let result = self
            .query(&self.statements.exists, &[QueryParam::from(id)])
            .await
            .context("exists", id)?;
        Ok(!result.is_empty())
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult> {
        self.query(query, &[]).await
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = match self.pool.acquire("health_check").await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Health check could not acquire a connection");
                return false;
            }
        };
        let healthy = match conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Health check ping failed");
                false
            }
        };
        self.pool.release(conn).await;
        healthy
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Relational adapter closed");
    }
}

impl std::fmt::Debug for RelationalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalAdapter")
            .field("db_type", &self.db_type())
            .field("dialect", &self.dialect)
            .field("acquire_timeout", &self.pool.acquire_timeout())
            .finish()
    }
}
