//! Statement execution against one borrowed connection.
//!
//! Every relational statement runs on a connection the caller already holds,
//! either a pooled lease or the connection bound to a transaction, so the
//! same code serves both paths.
//!
//! When `params` is empty the raw text is sent unprepared, which lets DDL and
//! multi-statement scripts through on engines that refuse to prepare them.

use crate::db::params::{push_mysql_param, push_postgres_param, push_sqlite_param};
use crate::db::query_builder::SqlDialect;
use crate::db::types::RowToJson;
use crate::error::{ProviderError, ProviderResult, ResultExt};
use crate::impl_conn_dispatch;
use crate::models::{DatabaseType, QueryParam, QueryResult};
use sqlx::{MySql, MySqlConnection, PgConnection, Postgres, Sqlite, SqliteConnection};
use std::time::Instant;
use tracing::debug;

/// A mutable borrow of one engine-specific physical connection.
pub enum ConnRef<'a> {
    MySql(&'a mut MySqlConnection),
    Postgres(&'a mut PgConnection),
    SQLite(&'a mut SqliteConnection),
}

impl ConnRef<'_> {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            ConnRef::MySql(_) => DatabaseType::MySQL,
            ConnRef::Postgres(_) => DatabaseType::PostgreSQL,
            ConnRef::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Run a row-returning statement and decode every row.
pub async fn fetch(
    conn: ConnRef<'_>,
    sql: &str,
    params: &[QueryParam],
) -> ProviderResult<QueryResult> {
    let start = Instant::now();
    debug!(sql = %sql, params = params.len(), "Executing query");

    let result = impl_conn_dispatch!(conn, |c, query| {
        let rows = if params.is_empty() {
            use sqlx::Executor;
            c.fetch_all(sql).await
        } else {
            query(sql, params).fetch_all(&mut *c).await
        };
        rows.map(|rows| process_rows(rows, start))
    });
    result.context("execute_query", sql)
}

/// Run a statement that returns no rows and report the affected row count.
pub async fn execute(conn: ConnRef<'_>, sql: &str, params: &[QueryParam]) -> ProviderResult<u64> {
    debug!(sql = %sql, params = params.len(), "Executing update");

    let result = impl_conn_dispatch!(conn, |c, query| {
        if params.is_empty() {
            use sqlx::Executor;
            c.execute(sql).await.map(|r| r.rows_affected())
        } else {
            query(sql, params)
                .execute(&mut *c)
                .await
                .map(|r| r.rows_affected())
        }
    });
    result.context("execute_update", sql)
}

/// Execute one parameterized statement once per row on a single connection.
///
/// The statement is prepared once and reused for every row. A failing row
/// stops the batch and surfaces the backend error; rows already executed are
/// not undone here. Run it inside a transaction for all-or-nothing behavior.
pub async fn execute_batch(
    conn: ConnRef<'_>,
    sql: &str,
    rows: &[Vec<QueryParam>],
) -> ProviderResult<u64> {
    let start = Instant::now();
    let result = impl_conn_dispatch!(conn, |c, query| {
        let mut inserted = 0u64;
        let mut failure = None;
        for row in rows {
            match query(sql, row).execute(&mut *c).await {
                Ok(r) => inserted += r.rows_affected(),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(inserted),
        }
    });
    let inserted = result.context("execute_batch_insert", sql)?;
    debug!(
        sql = %sql,
        rows = rows.len(),
        inserted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Executed batch"
    );
    Ok(inserted)
}

/// Largest number of bind parameters one statement may carry.
fn bind_limit(db_type: DatabaseType) -> usize {
    match db_type {
        DatabaseType::MySQL | DatabaseType::PostgreSQL => 65_535,
        DatabaseType::SQLite => 32_766,
    }
}

/// Send each chunk of rows as one multi-row `INSERT ... VALUES` statement.
macro_rules! insert_chunks {
    ($c:expr, $db:ty, $push:path, $head:expr, $rows:expr, $per_chunk:expr) => {{
        let mut inserted = 0u64;
        let mut failure = None;
        for chunk in $rows.chunks($per_chunk) {
            let mut builder = sqlx::QueryBuilder::<$db>::new($head);
            builder.push_values(chunk, |mut tuple, row| {
                for param in row {
                    $push(&mut tuple, param);
                }
            });
            match builder.build().execute(&mut *$c).await {
                Ok(r) => inserted += r.rows_affected(),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(inserted),
        }
    }};
}

/// Insert `rows` into `table` with multi-row `VALUES` lists.
///
/// Rows are grouped so each statement stays under the engine's bind limit,
/// which is one round trip for most fixture sets. Identifiers are quoted for
/// the engine. As with [`execute_batch`], chunks already sent are not undone
/// when a later one fails.
pub async fn insert_rows(
    conn: ConnRef<'_>,
    table: &str,
    columns: &[&str],
    rows: &[Vec<QueryParam>],
) -> ProviderResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    if columns.is_empty() {
        return Err(ProviderError::backend(
            "insert_rows",
            table,
            "At least one column is required",
            None,
        ));
    }
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
        return Err(ProviderError::backend(
            "insert_rows",
            table,
            format!(
                "Row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            ),
            None,
        ));
    }

    let db_type = conn.db_type();
    let dialect = SqlDialect::from(db_type);
    let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
    let head = format!(
        "INSERT INTO {} ({}) ",
        dialect.quote_identifier(table),
        quoted.join(", ")
    );
    let per_chunk = (bind_limit(db_type) / columns.len()).max(1);
    let start = Instant::now();

    let result = match conn {
        ConnRef::MySql(c) => {
            insert_chunks!(c, MySql, push_mysql_param, head.as_str(), rows, per_chunk)
        }
        ConnRef::Postgres(c) => {
            insert_chunks!(c, Postgres, push_postgres_param, head.as_str(), rows, per_chunk)
        }
        ConnRef::SQLite(c) => {
            insert_chunks!(c, Sqlite, push_sqlite_param, head.as_str(), rows, per_chunk)
        }
    };
    let inserted = result.context("insert_rows", table)?;
    debug!(
        table,
        rows = rows.len(),
        statements = rows.len().div_ceil(per_chunk),
        inserted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Inserted rows"
    );
    Ok(inserted)
}

fn process_rows<R: RowToJson>(rows: Vec<R>, start: Instant) -> QueryResult {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_json_map()).collect();
    QueryResult {
        columns,
        rows,
        rows_affected: None,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}
