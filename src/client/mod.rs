//! Native client seams for the non-relational backend families.
//!
//! Each family talks to its store through a small async trait shaped after
//! that store's own API. The embedded in-memory implementations are used when
//! no external client is injected into the provider.

pub mod bucket;
pub mod document;
pub mod key_value;

pub use bucket::{BucketClient, MemoryBucketStore};
pub use document::{DocumentClient, MemoryDocumentStore};
pub use key_value::{KeyValueClient, MemoryKeyValueStore};

use crate::error::ProviderError;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors reported by native clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl ClientError {
    /// Map onto the provider taxonomy, attaching operation and target.
    ///
    /// Adapters turn `NotFound` into an empty result before reaching here;
    /// one that still arrives is reported as a backend error.
    pub fn into_provider(self, operation: &str, target: &str) -> ProviderError {
        match self {
            ClientError::AlreadyExists(_) => ProviderError::duplicate_key(operation, target),
            ClientError::Unavailable(msg) => ProviderError::connection(
                operation,
                msg,
                "Check that the backend is running and reachable",
            ),
            ClientError::Authentication(msg) => ProviderError::connection(
                operation,
                msg,
                "Verify the configured credentials",
            ),
            ClientError::InvalidQuery(msg) => ProviderError::backend(operation, target, msg, None),
            ClientError::NotFound(what) => {
                ProviderError::backend(operation, target, format!("Not found: {}", what), None)
            }
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A value with an optional absolute expiry, shared by the embedded stores.
#[derive(Debug, Clone)]
pub(crate) struct StoredValue {
    pub value: JsonValue,
    pub expires_at: Option<Instant>,
}

impl StoredValue {
    pub fn new(value: JsonValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(Instant::now() + ttl);
    }
}
