//! Relational backend internals.
//!
//! This module provides:
//! - Connection pool management with lease accounting
//! - Statement execution on a borrowed connection
//! - Transactions bound to one pooled connection
//! - Schema introspection and the metadata cache
//! - Row decoding and parameter binding per engine
//! - Dialect-aware pagination
//! - Database dispatch macros for reducing code duplication

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod query_builder;
pub mod schema;
pub mod transaction;
pub mod types;

pub use executor::ConnRef;
pub use pool::{ConnectionPool, DbPool, PoolStatistics, PooledConnection};
pub use query_builder::{SqlDialect, build_paginated_query};
pub use schema::{SchemaInspector, SchemaMetadataService};
pub use transaction::{DbTransaction, TransactionContext, TransactionCoordinator};
