//! Bucket client seam (Couchbase-shaped).
//!
//! Lookups of a missing key fail with `NotFound` rather than returning an
//! empty value, and there is no separate existence probe.

use super::{ClientError, ClientResult, StoredValue};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value as JsonValue;
use std::time::Duration;

#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Create a document. Fails with `AlreadyExists` if the key is taken.
    async fn insert(&self, key: &str, value: JsonValue) -> ClientResult<()>;

    /// Fetch a document; `NotFound` when absent.
    async fn get(&self, key: &str) -> ClientResult<JsonValue>;

    async fn upsert(&self, key: &str, value: JsonValue) -> ClientResult<()>;

    /// Remove a document; `NotFound` when absent.
    async fn remove(&self, key: &str) -> ClientResult<()>;

    /// Reset the document's expiry; `NotFound` when absent.
    async fn touch(&self, key: &str, ttl: Duration) -> ClientResult<()>;

    /// Documents whose key starts with `prefix`, sorted by key.
    async fn scan_prefix(&self, prefix: &str) -> ClientResult<Vec<(String, JsonValue)>>;

    async fn ping(&self) -> ClientResult<()>;
}

/// In-process bucket with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    bucket: String,
    entries: DashMap<String, StoredValue>,
}

impl MemoryBucketStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            entries: DashMap::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn purge_if_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, v| v.is_expired());
    }

    fn not_found(key: &str) -> ClientError {
        ClientError::NotFound(key.to_string())
    }
}

#[async_trait]
impl BucketClient for MemoryBucketStore {
    async fn insert(&self, key: &str, value: JsonValue) -> ClientResult<()> {
        self.purge_if_expired(key);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(ClientError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(value));
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> ClientResult<JsonValue> {
        self.purge_if_expired(key);
        self.entries
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    async fn upsert(&self, key: &str, value: JsonValue) -> ClientResult<()> {
        self.entries.insert(key.to_string(), StoredValue::new(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        match self.entries.remove(key) {
            Some((_, v)) if !v.is_expired() => Ok(()),
            _ => Err(Self::not_found(key)),
        }
    }

    async fn touch(&self, key: &str, ttl: Duration) -> ClientResult<()> {
        self.purge_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expire_in(ttl);
                Ok(())
            }
            None => Err(Self::not_found(key)),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> ClientResult<Vec<(String, JsonValue)>> {
        let mut docs: Vec<(String, JsonValue)> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired() && e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }

    async fn ping(&self) -> ClientResult<()> {
        Ok(())
    }
}
