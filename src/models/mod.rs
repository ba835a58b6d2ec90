//! Data models for the provider layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{BackendFamily, Credentials, DatabaseType, ProviderState};
pub use query::{QueryParam, QueryResult};
pub use schema::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, TableInfo, TableMetadata, TableType,
};
