//! Test Data Provider Library
//!
//! One record/query contract over structurally different stores: pooled
//! relational engines (SQLite, PostgreSQL, MySQL), key-value stores, document
//! stores and bucket stores. Each [`Provider`] is bound to one backend
//! instance and fronts it with a TTL-bounded read-through cache.

pub mod adapter;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod models;
pub mod provider;

pub use config::{Config, ProviderConfig};
pub use error::{ProviderError, ProviderResult};
pub use models::{BackendFamily, QueryParam, QueryResult};
pub use provider::{Provider, ProviderBuilder};
