//! The uniform record/query contract and its per-family implementations.
//!
//! Every backend family implements [`BackendAdapter`] independently. The
//! provider wraps whichever adapter it selected in a [`CachingAdapter`], which
//! serves record reads and query results from the cache layer first.

pub mod bucket;
pub mod document;
pub mod key_value;
pub mod relational;

pub use bucket::BucketAdapter;
pub use document::DocumentAdapter;
pub use key_value::KeyValueAdapter;
pub use relational::RelationalAdapter;

use crate::cache::{CacheKey, CacheLayer, CachedValue};
use crate::error::ProviderResult;
use crate::models::{BackendFamily, QueryResult};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// One consistent record/query contract over a backend family.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn family(&self) -> BackendFamily;

    /// Create a record. `DuplicateKey` where the backend enforces uniqueness.
    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()>;

    /// `None` when the record does not exist.
    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>>;

    /// Create or replace.
    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()>;

    /// `true` iff a record existed and was removed.
    async fn delete(&self, id: &str) -> ProviderResult<bool>;

    /// Existence probe. Families without a native probe fall back to `get`.
    async fn exists(&self, id: &str) -> ProviderResult<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Backend-native expiry. `false` when unsupported or the record is absent.
    async fn expire(&self, _id: &str, _ttl_seconds: u64) -> ProviderResult<bool> {
        Ok(false)
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult>;

    /// The value as `get` would return it once `value` has been written.
    fn read_shape(&self, value: JsonValue) -> JsonValue {
        value
    }

    /// Lightweight liveness probe; never fails.
    async fn is_healthy(&self) -> bool;

    /// Release backend resources.
    async fn close(&self);
}

/// Read-through cache in front of another adapter.
///
/// Record writes refresh or drop the entry for that id only; cached query
/// results are left alone until invalidated explicitly or they expire.
pub struct CachingAdapter {
    inner: Arc<dyn BackendAdapter>,
    cache: Arc<dyn CacheLayer>,
}

impl CachingAdapter {
    pub fn new(inner: Arc<dyn BackendAdapter>, cache: Arc<dyn CacheLayer>) -> Self {
        Self { inner, cache }
    }

    /// Query results come back shared so a cache hit is a pointer copy.
    pub async fn execute_query_shared(&self, query: &str) -> ProviderResult<Arc<QueryResult>> {
        let key = CacheKey::Query(query.to_string());
        if let Some(CachedValue::Query(result)) = self.cache.get(&key) {
            trace!(query = %query, "Query cache hit");
            return Ok(result);
        }
        debug!(query = %query, "Query cache miss");
        let result = Arc::new(self.inner.execute_query(query).await?);
        self.cache.put(key, CachedValue::Query(Arc::clone(&result)));
        Ok(result)
    }

    fn record_key(id: &str) -> CacheKey {
        CacheKey::Record(id.to_string())
    }

    /// Cache a just-written record in the shape a backend read returns.
    fn remember(&self, id: &str, value: JsonValue) {
        let value = self.inner.read_shape(value);
        self.cache.put(Self::record_key(id), CachedValue::Record(value));
    }
}

#[async_trait]
impl BackendAdapter for CachingAdapter {
    fn family(&self) -> BackendFamily {
        self.inner.family()
    }

    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.inner.insert(id, value.clone()).await?;
        self.remember(id, value);
        Ok(())
    }

    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        let key = Self::record_key(id);
        if let Some(CachedValue::Record(value)) = self.cache.get(&key) {
            trace!(id = %id, "Record cache hit");
            return Ok(Some(value));
        }
        let value = self.inner.get(id).await?;
        if let Some(ref v) = value {
            self.cache.put(key, CachedValue::Record(v.clone()));
        }
        Ok(value)
    }

    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.inner.upsert(id, value.clone()).await?;
        self.remember(id, value);
        Ok(())
    }

    async fn delete(&self, id: &str) -> ProviderResult<bool> {
        let deleted = self.inner.delete(id).await;
        self.cache.invalidate(&Self::record_key(id));
        deleted
    }

    async fn exists(&self, id: &str) -> ProviderResult<bool> {
        self.inner.exists(id).await
    }

    async fn expire(&self, id: &str, ttl_seconds: u64) -> ProviderResult<bool> {
        let applied = self.inner.expire(id, ttl_seconds).await?;
        if applied {
            // The backend now owns the record's lifetime
            self.cache.invalidate(&Self::record_key(id));
        }
        Ok(applied)
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult> {
        Ok(self.execute_query_shared(query).await?.as_ref().clone())
    }

    fn read_shape(&self, value: JsonValue) -> JsonValue {
        self.inner.read_shape(value)
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }

    async fn close(&self) {
        self.inner.close().await;
        self.cache.invalidate_all();
    }
}

/// Rows of `{key, value}` for key-addressed stores.
pub(crate) fn key_value_rows(pairs: Vec<(String, JsonValue)>, start: Instant) -> QueryResult {
    let rows = pairs
        .into_iter()
        .map(|(key, value)| {
            let mut row = Map::new();
            row.insert("key".to_string(), JsonValue::String(key));
            row.insert("value".to_string(), value);
            row
        })
        .collect();
    QueryResult {
        columns: vec!["key".to_string(), "value".to_string()],
        rows,
        rows_affected: None,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}

/// One row per document; columns are the union of fields in first-seen order.
pub(crate) fn document_rows(documents: Vec<JsonValue>, start: Instant) -> QueryResult {
    let mut columns: Vec<String> = Vec::new();
    let rows: Vec<Map<String, JsonValue>> = documents
        .into_iter()
        .map(|doc| match doc {
            JsonValue::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        })
        .collect();
    for row in &rows {
        for field in row.keys() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.clone());
            }
        }
    }
    QueryResult {
        columns,
        rows,
        rows_affected: None,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}
