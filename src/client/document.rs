//! Document client seam (MongoDB-shaped).
//!
//! Documents are JSON objects addressed by `_id` within a named collection.
//! Filters are equality-only: every `path: value` pair of the filter must
//! match, where `path` may use dots to reach nested fields.

use super::{ClientError, ClientResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value as JsonValue};

pub const ID_FIELD: &str = "_id";

#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Insert a document. Fails with `AlreadyExists` on a duplicate `_id`.
    async fn insert_one(&self, collection: &str, id: &str, document: JsonValue) -> ClientResult<()>;

    async fn find_one(&self, collection: &str, id: &str) -> ClientResult<Option<JsonValue>>;

    /// Replace the document with this `_id`, inserting it when `upsert` is set.
    /// Returns whether a document matched.
    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: JsonValue,
        upsert: bool,
    ) -> ClientResult<bool>;

    async fn delete_one(&self, collection: &str, id: &str) -> ClientResult<bool>;

    async fn count(&self, collection: &str, filter: &JsonValue) -> ClientResult<u64>;

    async fn find(&self, collection: &str, filter: &JsonValue) -> ClientResult<Vec<JsonValue>>;

    async fn ping(&self) -> ClientResult<()>;
}

/// In-process document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    database: String,
    documents: DashMap<(String, String), JsonValue>,
}

impl MemoryDocumentStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            documents: DashMap::new(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }

    fn with_id(id: &str, document: JsonValue) -> ClientResult<JsonValue> {
        match document {
            JsonValue::Object(mut map) => {
                map.insert(ID_FIELD.to_string(), JsonValue::String(id.to_string()));
                Ok(JsonValue::Object(map))
            }
            other => Err(ClientError::InvalidQuery(format!(
                "documents must be JSON objects, got {}",
                json_type(&other)
            ))),
        }
    }

    fn matching(&self, collection: &str, filter: &JsonValue) -> ClientResult<Vec<JsonValue>> {
        let filter = as_filter(filter)?;
        let mut docs: Vec<(String, JsonValue)> = self
            .documents
            .iter()
            .filter(|e| e.key().0 == collection && matches_filter(e.value(), filter))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentStore {
    async fn insert_one(&self, collection: &str, id: &str, document: JsonValue) -> ClientResult<()> {
        let document = Self::with_id(id, document)?;
        match self.documents.entry(Self::key(collection, id)) {
            Entry::Occupied(_) => Err(ClientError::AlreadyExists(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(())
            }
        }
    }

    async fn find_one(&self, collection: &str, id: &str) -> ClientResult<Option<JsonValue>> {
        Ok(self
            .documents
            .get(&Self::key(collection, id))
            .map(|doc| doc.value().clone()))
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: JsonValue,
        upsert: bool,
    ) -> ClientResult<bool> {
        let document = Self::with_id(id, document)?;
        match self.documents.entry(Self::key(collection, id)) {
            Entry::Occupied(mut slot) => {
                slot.insert(document);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                if upsert {
                    slot.insert(document);
                }
                Ok(false)
            }
        }
    }

    async fn delete_one(&self, collection: &str, id: &str) -> ClientResult<bool> {
        Ok(self.documents.remove(&Self::key(collection, id)).is_some())
    }

    async fn count(&self, collection: &str, filter: &JsonValue) -> ClientResult<u64> {
        Ok(self.matching(collection, filter)?.len() as u64)
    }

    async fn find(&self, collection: &str, filter: &JsonValue) -> ClientResult<Vec<JsonValue>> {
        self.matching(collection, filter)
    }

    async fn ping(&self) -> ClientResult<()> {
        Ok(())
    }
}

fn as_filter(filter: &JsonValue) -> ClientResult<&Map<String, JsonValue>> {
    filter.as_object().ok_or_else(|| {
        ClientError::InvalidQuery(format!("filter must be a JSON object, got {}", json_type(filter)))
    })
}

/// Equality match of every filter entry against the document.
pub fn matches_filter(document: &JsonValue, filter: &Map<String, JsonValue>) -> bool {
    filter
        .iter()
        .all(|(path, expected)| lookup_path(document, path) == Some(expected))
}

fn lookup_path<'a>(document: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryDocumentStore::new("inventory");
        store.insert_one("items", "a", json!({"qty": 1})).await.unwrap();
        let err = store
            .insert_one("items", "a", json!({"qty": 2}))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::AlreadyExists("a".into()));
        // Same id in another collection is fine
        store.insert_one("orders", "a", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_one_includes_id() {
        let store = MemoryDocumentStore::new("inventory");
        store.insert_one("items", "a", json!({"qty": 1})).await.unwrap();
        let doc = store.find_one("items", "a").await.unwrap().unwrap();
        assert_eq!(doc, json!({"_id": "a", "qty": 1}));
        assert!(store.find_one("items", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_object_rejected() {
        let store = MemoryDocumentStore::new("inventory");
        let err = store.insert_one("items", "a", json!(5)).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_replace_with_and_without_upsert() {
        let store = MemoryDocumentStore::new("inventory");
        assert!(!store.replace_one("items", "a", json!({"v": 1}), false).await.unwrap());
        assert!(store.find_one("items", "a").await.unwrap().is_none());

        assert!(!store.replace_one("items", "a", json!({"v": 1}), true).await.unwrap());
        assert!(store.replace_one("items", "a", json!({"v": 2}), true).await.unwrap());
        assert_eq!(
            store.find_one("items", "a").await.unwrap(),
            Some(json!({"_id": "a", "v": 2}))
        );
    }

    #[tokio::test]
    async fn test_find_with_nested_filter() {
        let store = MemoryDocumentStore::new("inventory");
        store
            .insert_one("items", "b", json!({"kind": "tool", "spec": {"size": "L"}}))
            .await
            .unwrap();
        store
            .insert_one("items", "a", json!({"kind": "tool", "spec": {"size": "S"}}))
            .await
            .unwrap();
        store.insert_one("items", "c", json!({"kind": "food"})).await.unwrap();

        let tools = store.find("items", &json!({"kind": "tool"})).await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["_id"], "a");

        let large = store
            .find("items", &json!({"spec.size": "L"}))
            .await
            .unwrap();
        assert_eq!(large.len(), 1);
        assert_eq!(store.count("items", &json!({})).await.unwrap(), 3);
        assert_eq!(store.count("items", &json!({"_id": "c"})).await.unwrap(), 1);

        let err = store.find("items", &json!([1])).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = MemoryDocumentStore::new("inventory");
        store.insert_one("items", "a", json!({})).await.unwrap();
        assert!(store.delete_one("items", "a").await.unwrap());
        assert!(!store.delete_one("items", "a").await.unwrap());
    }
}
