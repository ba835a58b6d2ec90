//! The provider facade.
//!
//! A [`Provider`] binds one [`ProviderConfig`] to one backend instance. It owns
//! its cache and, for the relational family, its connection pool; nothing is
//! shared between two providers even when they point at the same backend.
//!
//! Lifecycle: `Uninitialized -> Connected -> Closed`. A provider is returned
//! from [`ProviderBuilder::build`] already connected. After [`Provider::close`]
//! every operation except `close` and `is_healthy` fails with `Closed`.
//!
//! ```ignore
//! let provider = Provider::connect(ProviderConfig::sqlite("fixtures.db")).await?;
//! provider.upsert("user:1", json!({"name": "Ada"})).await?;
//! let rows = provider.execute_query("SELECT COUNT(*) FROM provider_records").await?;
//! provider.close().await;
//! ```

use crate::adapter::{
    BackendAdapter, BucketAdapter, CachingAdapter, DocumentAdapter, KeyValueAdapter,
    RelationalAdapter,
};
use crate::cache::{CacheKey, CacheLayer, CacheStats, CachedValue, TtlCache};
use crate::client::{
    BucketClient, DocumentClient, KeyValueClient, MemoryBucketStore, MemoryDocumentStore,
    MemoryKeyValueStore,
};
use crate::config::{DEFAULT_HEALTH_TIMEOUT_SECS, ProviderConfig};
use crate::db::pool::PoolStatistics;
use crate::db::transaction::TransactionContext;
use crate::error::{ProviderError, ProviderResult};
use crate::health::{HealthChecker, HealthReport};
use crate::models::{BackendFamily, ForeignKey, ProviderState, QueryParam, QueryResult, TableInfo};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Assembles a provider, with optional injected dependencies.
///
/// Anything not injected is built from the configuration: a [`TtlCache`]
/// sized from `config.cache`, and an embedded in-memory client for the
/// non-relational families.
pub struct ProviderBuilder {
    config: ProviderConfig,
    cache: Option<Arc<dyn CacheLayer>>,
    key_value: Option<Arc<dyn KeyValueClient>>,
    document: Option<Arc<dyn DocumentClient>>,
    bucket: Option<Arc<dyn BucketClient>>,
    health_timeout: Duration,
}

impl ProviderBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            cache: None,
            key_value: None,
            document: None,
            bucket: None,
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CacheLayer>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn key_value_client(mut self, client: Arc<dyn KeyValueClient>) -> Self {
        self.key_value = Some(client);
        self
    }

    pub fn document_client(mut self, client: Arc<dyn DocumentClient>) -> Self {
        self.document = Some(client);
        self
    }

    pub fn bucket_client(mut self, client: Arc<dyn BucketClient>) -> Self {
        self.bucket = Some(client);
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Validate the configuration and connect. Invalid settings fail here,
    /// never lazily on first use.
    pub async fn build(self) -> ProviderResult<Provider> {
        let config = self.config;
        config.validate()?;
        let state = AtomicU8::new(ProviderState::Uninitialized.as_u8());

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(TtlCache::<CacheKey, CachedValue>::new(
                config.cache.ttl(),
                config.cache.max_size,
            ))
        });
        let database = config.database.clone().unwrap_or_default();

        let mut relational = None;
        let inner: Arc<dyn BackendAdapter> = match config.family {
            BackendFamily::Relational => {
                let adapter = Arc::new(RelationalAdapter::connect(&config).await?);
                relational = Some(Arc::clone(&adapter));
                adapter
            }
            BackendFamily::KeyValue => {
                let client = self
                    .key_value
                    .unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
                Arc::new(KeyValueAdapter::new(client))
            }
            BackendFamily::Document => {
                let client = self
                    .document
                    .unwrap_or_else(|| Arc::new(MemoryDocumentStore::new(database)));
                Arc::new(DocumentAdapter::new(client, config.record_table.clone()))
            }
            BackendFamily::Bucket => {
                let client = self
                    .bucket
                    .unwrap_or_else(|| Arc::new(MemoryBucketStore::new(database)));
                Arc::new(BucketAdapter::new(client))
            }
        };

        state.store(ProviderState::Connected.as_u8(), Ordering::Release);
        let target = config.masked_connection_string();
        info!(
            family = %config.family,
            target = %target,
            cache_ttl_minutes = config.cache.ttl_minutes,
            cache_max_size = config.cache.max_size,
            "Provider connected"
        );

        Ok(Provider {
            family: config.family,
            state,
            adapter: CachingAdapter::new(inner, Arc::clone(&cache)),
            cache,
            relational,
            health: HealthChecker::new(self.health_timeout),
            target,
        })
    }
}

/// One configured binding to one backend instance.
pub struct Provider {
    family: BackendFamily,
    state: AtomicU8,
    adapter: CachingAdapter,
    cache: Arc<dyn CacheLayer>,
    relational: Option<Arc<RelationalAdapter>>,
    health: HealthChecker,
    /// Masked connection string for logs
    target: String,
}

impl Provider {
    /// Build a provider with default dependencies.
    pub async fn connect(config: ProviderConfig) -> ProviderResult<Self> {
        ProviderBuilder::new(config).build().await
    }

    pub fn builder(config: ProviderConfig) -> ProviderBuilder {
        ProviderBuilder::new(config)
    }

    pub fn family(&self) -> BackendFamily {
        self.family
    }

    pub fn state(&self) -> ProviderState {
        ProviderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn ensure_open(&self, operation: &str) -> ProviderResult<()> {
        match self.state() {
            ProviderState::Closed => Err(ProviderError::closed(operation)),
            _ => Ok(()),
        }
    }

    fn relational(&self, operation: &str) -> ProviderResult<&RelationalAdapter> {
        self.ensure_open(operation)?;
        self.relational
            .as_deref()
            .ok_or_else(|| ProviderError::unsupported(operation, self.family.display_name()))
    }

    // ---- uniform record contract ----

    pub async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.ensure_open("insert")?;
        self.adapter.insert(id, value).await
    }

    pub async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        self.ensure_open("get")?;
        self.adapter.get(id).await
    }

    pub async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.ensure_open("upsert")?;
        self.adapter.upsert(id, value).await
    }

    pub async fn delete(&self, id: &str) -> ProviderResult<bool> {
        self.ensure_open("delete")?;
        self.adapter.delete(id).await
    }

    pub async fn exists(&self, id: &str) -> ProviderResult<bool> {
        self.ensure_open("exists")?;
        self.adapter.exists(id).await
    }

    pub async fn expire(&self, id: &str, ttl_seconds: u64) -> ProviderResult<bool> {
        self.ensure_open("expire")?;
        self.adapter.expire(id, ttl_seconds).await
    }

    /// Read-through query. The literal text is the cache key, so two
    /// spellings of the same query are cached separately.
    pub async fn execute_query(&self, query: &str) -> ProviderResult<Arc<QueryResult>> {
        self.ensure_open("execute_query")?;
        self.adapter.execute_query_shared(query).await
    }

    // ---- cache controls ----

    pub fn invalidate_query(&self, query: &str) -> ProviderResult<()> {
        self.ensure_open("invalidate_query")?;
        self.cache.invalidate(&CacheKey::Query(query.to_string()));
        Ok(())
    }

    pub fn invalidate_record(&self, id: &str) -> ProviderResult<()> {
        self.ensure_open("invalidate_record")?;
        self.cache.invalidate(&CacheKey::Record(id.to_string()));
        Ok(())
    }

    pub fn clear_cache(&self) -> ProviderResult<()> {
        self.ensure_open("clear_cache")?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn cache_stats(&self) -> ProviderResult<CacheStats> {
        self.ensure_open("cache_stats")?;
        Ok(self.cache.stats())
    }

    // ---- relational-only operations ----

    /// DDL/DML in autocommit mode. Does not touch cached query results.
    pub async fn execute_update(&self, sql: &str, params: &[QueryParam]) -> ProviderResult<u64> {
        self.relational("execute_update")?
            .execute_update(sql, params)
            .await
    }

    pub async fn execute_batch_insert(
        &self,
        sql: &str,
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        self.relational("execute_batch_insert")?
            .execute_batch_insert(sql, rows)
            .await
    }

    /// Multi-row `INSERT` built from a table and column list, sent in as few
    /// statements as the engine's bind limit allows.
    pub async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<QueryParam>],
    ) -> ProviderResult<u64> {
        self.relational("insert_rows")?
            .insert_rows(table, columns, rows)
            .await
    }

    /// Run `work` on one dedicated connection; commit on `Ok`, roll back on
    /// `Err` or panic. See [`crate::db::TransactionCoordinator`].
    pub async fn execute_in_transaction<T, F>(&self, work: F) -> ProviderResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut TransactionContext) -> BoxFuture<'c, ProviderResult<T>> + Send,
    {
        self.relational("execute_in_transaction")?
            .transactions()
            .execute_in_transaction(work)
            .await
    }

    /// `base_query` with this backend's pagination clause appended.
    pub fn paginated_query(
        &self,
        base_query: &str,
        offset: u64,
        limit: u64,
    ) -> ProviderResult<String> {
        Ok(self
            .relational("paginated_query")?
            .paginated_query(base_query, offset, limit))
    }

    pub async fn get_column_names(&self, table: &str) -> ProviderResult<Vec<String>> {
        self.relational("get_column_names")?
            .schema()
            .get_column_names(table)
            .await
    }

    pub async fn get_column_data_types(
        &self,
        table: &str,
    ) -> ProviderResult<HashMap<String, String>> {
        self.relational("get_column_data_types")?
            .schema()
            .get_column_data_types(table)
            .await
    }

    pub async fn get_primary_keys(&self, table: &str) -> ProviderResult<Vec<String>> {
        self.relational("get_primary_keys")?
            .schema()
            .get_primary_keys(table)
            .await
    }

    pub async fn get_foreign_keys(&self, table: &str) -> ProviderResult<Vec<ForeignKey>> {
        self.relational("get_foreign_keys")?
            .schema()
            .get_foreign_keys(table)
            .await
    }

    pub async fn clear_cache_for_table(&self, table: &str) -> ProviderResult<()> {
        self.relational("clear_cache_for_table")?
            .schema()
            .clear_cache_for_table(table)
            .await;
        Ok(())
    }

    pub async fn clear_all_metadata(&self) -> ProviderResult<()> {
        self.relational("clear_all_metadata")?
            .schema()
            .clear_all_metadata()
            .await;
        Ok(())
    }

    pub async fn list_tables(&self) -> ProviderResult<Vec<TableInfo>> {
        self.relational("list_tables")?.schema().list_tables().await
    }

    pub fn pool_statistics(&self) -> ProviderResult<PoolStatistics> {
        Ok(self.relational("pool_statistics")?.pool_statistics())
    }

    /// `None` for non-relational families or when the version lookup failed.
    pub fn server_version(&self) -> ProviderResult<Option<String>> {
        self.ensure_open("server_version")?;
        Ok(self
            .relational
            .as_ref()
            .and_then(|r| r.server_version().map(str::to_string)))
    }

    // ---- lifecycle ----

    /// `false` when closed, unreachable, or the probe times out. Never fails.
    pub async fn is_healthy(&self) -> bool {
        if self.state() == ProviderState::Closed {
            return false;
        }
        self.health.is_healthy(&self.adapter).await
    }

    pub async fn health_report(&self) -> HealthReport {
        if self.state() == ProviderState::Closed {
            return HealthReport {
                family: self.family,
                healthy: false,
                latency_ms: 0,
                timed_out: false,
            };
        }
        self.health.report(&self.adapter).await
    }

    /// Release backend resources and drop cached entries. Idempotent.
    pub async fn close(&self) {
        let previous = self
            .state
            .swap(ProviderState::Closed.as_u8(), Ordering::AcqRel);
        if ProviderState::from_u8(previous) == ProviderState::Closed {
            debug!(target = %self.target, "Provider already closed");
            return;
        }
        self.adapter.close().await;
        info!(family = %self.family, target = %self.target, "Provider closed");
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("family", &self.family)
            .field("state", &self.state())
            .field("target", &self.target)
            .finish()
    }
}
