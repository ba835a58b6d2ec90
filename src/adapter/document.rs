//! Document family adapter.
//!
//! Records live in one collection. Values must be JSON objects; the `_id`
//! field is managed by the store and stripped on read. Query text is a JSON
//! equality filter over that collection, e.g. `{"status": "active"}`.

use super::{BackendAdapter, document_rows};
use crate::client::document::ID_FIELD;
use crate::client::{ClientError, DocumentClient};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{BackendFamily, QueryResult};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct DocumentAdapter {
    client: Arc<dyn DocumentClient>,
    collection: String,
}

impl DocumentAdapter {
    pub fn new(client: Arc<dyn DocumentClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn strip_id(mut document: JsonValue) -> JsonValue {
        if let Some(map) = document.as_object_mut() {
            map.remove(ID_FIELD);
        }
        document
    }
}

#[async_trait]
impl BackendAdapter for DocumentAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Document
    }

    async fn insert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.client
            .insert_one(&self.collection, id, value)
            .await
            .map_err(|e| e.into_provider("insert", id))
    }

    async fn get(&self, id: &str) -> ProviderResult<Option<JsonValue>> {
        match self.client.find_one(&self.collection, id).await {
            Ok(doc) => Ok(doc.map(Self::strip_id)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into_provider("get", id)),
        }
    }

    async fn upsert(&self, id: &str, value: JsonValue) -> ProviderResult<()> {
        self.client
            .replace_one(&self.collection, id, value, true)
            .await
            .map(|_| ())
            .map_err(|e| e.into_provider("upsert", id))
    }

    async fn delete(&self, id: &str) -> ProviderResult<bool> {
        match self.client.delete_one(&self.collection, id).await {
            Ok(deleted) => Ok(deleted),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into_provider("delete", id)),
        }
    }

    fn read_shape(&self, value: JsonValue) -> JsonValue {
        Self::strip_id(value)
    }

    async fn exists(&self, id: &str) -> ProviderResult<bool> {
        let count = self
            .client
            .count(&self.collection, &json!({ ID_FIELD: id }))
            .await
            .map_err(|e| e.into_provider("exists", id))?;
        Ok(count > 0)
    }

    async fn execute_query(&self, query: &str) -> ProviderResult<QueryResult> {
        let start = Instant::now();
        let filter: JsonValue = serde_json::from_str(query).map_err(|e| {
            ProviderError::backend(
                "execute_query",
                query,
                format!("Filter is not valid JSON: {}", e),
                None,
            )
        })?;
        let documents = self
            .client
            .find(&self.collection, &filter)
            .await
            .map_err(|e| e.into_provider("execute_query", query))?;
        debug!(collection = %self.collection, matched = documents.len(), "Found documents");
        Ok(document_rows(documents, start))
    }

    async fn is_healthy(&self) -> bool {
        match self.client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Document store ping failed");
                false
            }
        }
    }

    async fn close(&self) {
        debug!(collection = %self.collection, "Document adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryDocumentStore;

    fn adapter() -> DocumentAdapter {
        DocumentAdapter::new(Arc::new(MemoryDocumentStore::new("inventory")), "records")
    }

    #[tokio::test]
    async fn test_get_strips_id() {
        let docs = adapter();
        docs.insert("a", json!({"qty": 3})).await.unwrap();
        assert_eq!(docs.get("a").await.unwrap(), Some(json!({"qty": 3})));
        assert!(docs.exists("a").await.unwrap());
        assert!(!docs.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_duplicate_and_non_object() {
        let docs = adapter();
        docs.insert("a", json!({})).await.unwrap();
        assert!(matches!(
            docs.insert("a", json!({})).await,
            Err(ProviderError::DuplicateKey { .. })
        ));
        assert!(matches!(
            docs.insert("b", json!("scalar")).await,
            Err(ProviderError::BackendExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_expire_unsupported() {
        let docs = adapter();
        docs.upsert("a", json!({})).await.unwrap();
        assert!(!docs.expire("a", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_filter() {
        let docs = adapter();
        docs.upsert("a", json!({"status": "active"})).await.unwrap();
        docs.upsert("b", json!({"status": "archived"})).await.unwrap();

        let result = docs.execute_query(r#"{"status": "active"}"#).await.unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0]["_id"], "a");

        let err = docs.execute_query("status = active").await.unwrap_err();
        assert!(matches!(err, ProviderError::BackendExecution { ref target, .. } if target == "status = active"));
    }
}
