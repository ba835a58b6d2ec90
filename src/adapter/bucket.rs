//! Bucket family adapter.
//!
//! The bucket client reports misses as `NotFound` errors; here they become
//! empty results. Query text is a key prefix.

use super::{BackendAdapter, key_value_rows};
use crate::client::{BucketClient, ClientError};
use crate::error::ProviderResult;
use crate::models::{BackendFamily, QueryResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct BucketAdapter {
    client: Arc<dyn BucketClient>,
}

impl BucketAdapter {
    pub fn new(client: Arc<dyn BucketClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendAdapter for BucketAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Bucket
    }

    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.client
            .insert(id, value)
            .await
            .map_err(|e| e.into_provider("insert", id))
    }

    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        match self.client.get(id).await {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into_provider("get", id)),
        }
    }

    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.client
            .upsert(id, value)
            .await
            .map_err(|e| e.into_provider("upsert", id))
    }

    async fn delete(&self, id: &str) -> ProviderResult<bool> {
        match self.client.remove(id).await {
            Ok(()) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into_provider("delete", id)),
        }
    }

    async fn expire(&self, id: &str, ttl_seconds: u64) -> ProviderResult<bool> {
        match self.client.touch(id, Duration::from_secs(ttl_seconds)).await {
            Ok(()) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into_provider("expire", id)),
        }
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult> {
        let start = Instant::now();
        let pairs = self
            .client
            .scan_prefix(query)
            .await
            .map_err(|e| e.into_provider("execute_query", query))?;
        debug!(prefix = %query, matched = pairs.len(), "Scanned bucket");
        Ok(key_value_rows(pairs, start))
    }

    async fn is_healthy(&self) -> bool {
        match self.client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Bucket ping failed");
                false
            }
        }
    }

    async fn close(&self) {
        debug!("Bucket adapter closed");
    }
}
