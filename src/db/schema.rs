//! Schema introspection and the per-table metadata cache.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface and
//! running on a borrowed connection.
//!
//! A table the catalog does not know yields empty metadata rather than an
//! error, so callers treat "missing" and "empty" the same way.

use crate::db::executor::ConnRef;
use crate::db::pool::ConnectionPool;
use crate::error::{ProviderResult, ResultExt};
use crate::models::{ColumnDefinition, ForeignKey, ForeignKeyAction, TableInfo, TableMetadata, TableType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Catalog queries for one connection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List all tables (and views) in the database or schema.
    pub async fn list_tables(
        conn: ConnRef<'_>,
        schema: Option<&str>,
    ) -> ProviderResult<Vec<TableInfo>> {
        let tables = match conn {
            ConnRef::Postgres(c) => postgres::list_tables(c, schema).await,
            ConnRef::MySql(c) => mysql::list_tables(c, schema).await,
            ConnRef::SQLite(c) => sqlite::list_tables(c).await,
        };
        tables.context("list_tables", schema.unwrap_or_default())
    }

    /// Columns and foreign keys of one table. Empty when the table does not exist.
    pub async fn table_metadata(
        conn: ConnRef<'_>,
        table_name: &str,
        schema: Option<&str>,
    ) -> ProviderResult<TableMetadata> {
        let result = match conn {
            ConnRef::Postgres(c) => postgres::describe_table(c, table_name, schema).await,
            ConnRef::MySql(c) => mysql::describe_table(c, table_name, schema).await,
            ConnRef::SQLite(c) => sqlite::describe_table(c, table_name).await,
        };
        let (columns, foreign_keys) = result.context("describe_table", table_name)?;
        Ok(TableMetadata::new(table_name, columns, foreign_keys))
    }
}

/// Caches introspected metadata per table name until told otherwise.
#[derive(Debug)]
pub struct SchemaMetadataService {
    pool: Arc<ConnectionPool>,
    schema: Option<String>,
    cache: RwLock<HashMap<String, Arc<TableMetadata>>>,
}

impl SchemaMetadataService {
    pub fn new(pool: Arc<ConnectionPool>, schema: Option<String>) -> Self {
        Self {
            pool,
            schema,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached metadata for `table`, introspecting on a miss.
    ///
    /// Empty results (unknown tables) are returned but not cached, so a table
    /// created later is picked up on the next call.
    pub async fn table_metadata(&self, table: &str) -> ProviderResult<Arc<TableMetadata>> {
        if let Some(metadata) = self.cache.read().await.get(table) {
            debug!(table = %table, "Schema cache hit");
            return Ok(Arc::clone(metadata));
        }

        let mut conn = self.pool.acquire("describe_table").await?;
        let result =
            SchemaInspector::table_metadata(conn.as_conn(), table, self.schema.as_deref()).await;
        self.pool.release(conn).await;
        let metadata = Arc::new(result?);

        debug!(
            table = %table,
            columns = metadata.columns.len(),
            foreign_keys = metadata.foreign_keys.len(),
            "Introspected table"
        );
        if !metadata.is_empty() {
            self.cache
                .write()
                .await
                .insert(table.to_string(), Arc::clone(&metadata));
        }
        Ok(metadata)
    }

    pub async fn get_column_names(&self, table: &str) -> ProviderResult<Vec<String>> {
        Ok(self.table_metadata(table).await?.column_names())
    }

    pub async fn get_column_data_types(&self, table: &str) -> ProviderResult<HashMap<String, String>> {
        Ok(self.table_metadata(table).await?.column_data_types())
    }

    pub async fn get_primary_keys(&self, table: &str) -> ProviderResult<Vec<String>> {
        Ok(self.table_metadata(table).await?.primary_keys.clone())
    }

    pub async fn get_foreign_keys(&self, table: &str) -> ProviderResult<Vec<ForeignKey>> {
        Ok(self.table_metadata(table).await?.foreign_keys.clone())
    }

    pub async fn clear_cache_for_table(&self, table: &str) {
        if self.cache.write().await.remove(table).is_some() {
            debug!(table = %table, "Cleared cached table metadata");
        }
    }

    pub async fn clear_all_metadata(&self) {
        self.cache.write().await.clear();
    }

    /// Number of tables with cached metadata.
    pub async fn cached_tables(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Uncached table listing.
    pub async fn list_tables(&self) -> ProviderResult<Vec<TableInfo>> {
        let mut conn = self.pool.acquire("list_tables").await?;
        let result = SchemaInspector::list_tables(conn.as_conn(), self.schema.as_deref()).await;
        self.pool.release(conn).await;
        result
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name, table_type
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name,
            format_type(a.atttypid, a.atttypmod) as column_type,
            c.is_nullable,
            c.column_default,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END as is_primary_key
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = $2
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
        "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            kcu.column_name,
            ccu.table_name AS foreign_table_name,
            ccu.column_name AS foreign_column_name,
            rc.delete_rule,
            rc.update_rule
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        JOIN information_schema.referential_constraints rc
            ON rc.constraint_name = tc.constraint_name
            AND rc.constraint_schema = tc.table_schema
        WHERE tc.table_name = $1
        AND tc.table_schema = $2
        AND tc.constraint_type = 'FOREIGN KEY'
        "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(k.COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(k.REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(k.REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME,
            CONVERT(r.DELETE_RULE USING utf8) AS DELETE_RULE,
            CONVERT(r.UPDATE_RULE USING utf8) AS UPDATE_RULE
        FROM information_schema.KEY_COLUMN_USAGE k
        JOIN information_schema.REFERENTIAL_CONSTRAINTS r
            ON r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
            AND r.CONSTRAINT_SCHEMA = k.TABLE_SCHEMA
        WHERE k.TABLE_NAME = ?
        AND k.TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND k.REFERENCED_TABLE_NAME IS NOT NULL
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    const DEFAULT_SCHEMA: &str = "public";

    pub async fn list_tables(
        conn: &mut PgConnection,
        schema: Option<&str>,
    ) -> Result<Vec<TableInfo>, sqlx::Error> {
        let schema_name = schema.unwrap_or(DEFAULT_SCHEMA);
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema_name)
            .fetch_all(conn)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("table_name")?;
                let type_str: String = row.try_get("table_type")?;
                Ok(TableInfo::new(name, TableType::parse(&type_str)).with_schema(schema_name))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        debug!(count = tables.len(), "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        conn: &mut PgConnection,
        table_name: &str,
        schema: Option<&str>,
    ) -> Result<(Vec<ColumnDefinition>, Vec<ForeignKey>), sqlx::Error> {
        let schema_name = schema.unwrap_or(DEFAULT_SCHEMA);
        let columns = fetch_columns(&mut *conn, table_name, schema_name).await?;
        if columns.is_empty() {
            return Ok((columns, Vec::new()));
        }
        let foreign_keys = fetch_foreign_keys(conn, table_name, schema_name).await?;
        Ok((columns, foreign_keys))
    }

    async fn fetch_columns(
        conn: &mut PgConnection,
        table_name: &str,
        schema_name: &str,
    ) -> Result<Vec<ColumnDefinition>, sqlx::Error> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let column_type: String = row.try_get("column_type")?;
                let nullable: String = row.try_get("is_nullable")?;
                let default_value: Option<String> = row.try_get("column_default").ok().flatten();
                let is_pk: bool = row.try_get("is_primary_key")?;

                let mut col = ColumnDefinition::new(name, column_type, nullable == "YES")
                    .with_primary_key(is_pk);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    async fn fetch_foreign_keys(
        conn: &mut PgConnection,
        table_name: &str,
        schema_name: &str,
    ) -> Result<Vec<ForeignKey>, sqlx::Error> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| {
                let column: String = row.try_get("column_name")?;
                let ref_table: String = row.try_get("foreign_table_name")?;
                let ref_column: String = row.try_get("foreign_column_name")?;
                let delete_rule: String = row.try_get("delete_rule")?;
                let update_rule: String = row.try_get("update_rule")?;

                Ok(ForeignKey::new(column, ref_table, ref_column)
                    .with_on_delete(ForeignKeyAction::parse(&delete_rule))
                    .with_on_update(ForeignKeyAction::parse(&update_rule)))
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlConnection, Row};

    /// Safely get an optional string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    pub async fn list_tables(
        conn: &mut MySqlConnection,
        schema: Option<&str>,
    ) -> Result<Vec<TableInfo>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(conn)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }
                let mut table = TableInfo::new(name, TableType::parse(&get_string(row, "TABLE_TYPE")));
                if let Some(s) = schema {
                    table = table.with_schema(s);
                }
                Some(table)
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        conn: &mut MySqlConnection,
        table_name: &str,
        schema: Option<&str>,
    ) -> Result<(Vec<ColumnDefinition>, Vec<ForeignKey>), sqlx::Error> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;

        let columns: Vec<ColumnDefinition> = rows
            .iter()
            .map(|row| {
                let mut col = ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_primary_key(get_string(row, "COLUMN_KEY") == "PRI");
                if let Some(def) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(def);
                }
                col
            })
            .collect();
        if columns.is_empty() {
            return Ok((columns, Vec::new()));
        }

        let fk_rows = sqlx::query(queries::mysql::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(conn)
            .await?;
        let foreign_keys = fk_rows
            .iter()
            .map(|row| {
                ForeignKey::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "REFERENCED_TABLE_NAME"),
                    get_string(row, "REFERENCED_COLUMN_NAME"),
                )
                .with_on_delete(ForeignKeyAction::parse(&get_string(row, "DELETE_RULE")))
                .with_on_update(ForeignKeyAction::parse(&get_string(row, "UPDATE_RULE")))
            })
            .collect();

        Ok((columns, foreign_keys))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    /// PRAGMA arguments cannot be bound, so the name is quoted as a literal.
    fn quote_literal(name: &str) -> String {
        format!("'{}'", name.replace('\'', "''"))
    }

    pub async fn list_tables(conn: &mut SqliteConnection) -> Result<Vec<TableInfo>, sqlx::Error> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(conn)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let type_str: String = row.try_get("type")?;
                Ok(TableInfo::new(name, TableType::parse(&type_str)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn describe_table(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> Result<(Vec<ColumnDefinition>, Vec<ForeignKey>), sqlx::Error> {
        let columns = fetch_columns(&mut *conn, table_name).await?;
        if columns.is_empty() {
            return Ok((columns, Vec::new()));
        }
        let foreign_keys = fetch_foreign_keys(conn, table_name).await?;
        Ok((columns, foreign_keys))
    }

    async fn fetch_columns(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> Result<Vec<ColumnDefinition>, sqlx::Error> {
        let pragma_query = format!("PRAGMA table_info({})", quote_literal(table_name));
        let rows = sqlx::query(&pragma_query).fetch_all(conn).await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
                let pk: i64 = row.try_get("pk")?;

                let mut col =
                    ColumnDefinition::new(name, data_type, notnull == 0).with_primary_key(pk > 0);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    async fn fetch_foreign_keys(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> Result<Vec<ForeignKey>, sqlx::Error> {
        let fk_query = format!("PRAGMA foreign_key_list({})", quote_literal(table_name));
        let rows = sqlx::query(&fk_query).fetch_all(conn).await?;

        rows.iter()
            .map(|row| {
                let column: String = row.try_get("from")?;
                let ref_table: String = row.try_get("table")?;
                // NULL when the reference targets the parent's primary key implicitly
                let ref_column: Option<String> = row.try_get("to")?;
                let on_delete: String = row.try_get("on_delete").unwrap_or_default();
                let on_update: String = row.try_get("on_update").unwrap_or_default();

                Ok(ForeignKey::new(column, ref_table, ref_column.unwrap_or_default())
                    .with_on_delete(ForeignKeyAction::parse(&on_delete))
                    .with_on_update(ForeignKeyAction::parse(&on_update)))
            })
            .collect()
    }

}
