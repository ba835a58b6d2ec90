//! Key-value family adapter.
//!
//! Query text is a key glob (`user:*`); the result has one `{key, value}` row
//! per live matching key.

use super::{BackendAdapter, key_value_rows};
use crate::client::{ClientError, KeyValueClient};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{BackendFamily, QueryResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct KeyValueAdapter {
    client: Arc<dyn KeyValueClient>,
}

impl KeyValueAdapter {
    pub fn new(client: Arc<dyn KeyValueClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendAdapter for KeyValueAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::KeyValue
    }

    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        let created = self
            .client
            .set_nx(id, value)
            .await
            .map_err(|e| e.into_provider("insert", id))?;
        if created {
            Ok(())
        } else {
            Err(ProviderError::duplicate_key("insert", id))
        }
    }

    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        match self.client.get(id).await {
            Ok(value) => Ok(value),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into_provider("get", id)),
        }
    }

    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.client
            .set(id, value)
            .await
            .map_err(|e| e.into_provider("upsert", id))
    }

    async fn delete(&self, id: &str) -> ProviderResult<bool> {
        match self.client.del(id).await {
            Ok(deleted) => Ok(deleted),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into_provider("delete", id)),
        }
    }

    async fn exists(&self, id: &str) -> ProviderResult<bool> {
        self.client
            .exists(id)
            .await
            .map_err(|e| e.into_provider("exists", id))
    }

    async fn expire(&self, id: &str, ttl_seconds: u64) -> ProviderResult<bool> {
        match self.client.expire(id, Duration::from_secs(ttl_seconds)).await {
            Ok(applied) => Ok(applied),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into_provider("expire", id)),
        }
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult> {
        let start = Instant::now();
        let keys = self
            .client
            .keys(query)
            .await
            .map_err(|e| e.into_provider("execute_query", query))?;

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between KEYS and GET
            if let Some(value) = self.get(&key).await? {
                pairs.push((key, value));
            }
        }
        debug!(pattern = %query, matched = pairs.len(), "Scanned keys");
        Ok(key_value_rows(pairs, start))
    }

    async fn is_healthy(&self) -> bool {
        match self.client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Key-value ping failed");
                false
            }
        }
    }

    async fn close(&self) {
        debug!("Key-value adapter closed");
    }
}
