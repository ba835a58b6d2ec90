//! Parameter binding utilities for database queries.
//!
//! `QueryParam` values are bound positionally; the `*_query` helpers build a
//! statement and bind a whole parameter slice in one call. The `push_*_param`
//! helpers bind into one tuple of a multi-row `QueryBuilder` statement.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // No native JSON type; stored as text
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

pub(crate) fn mysql_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, MySql, MySqlArguments> {
    params.iter().fold(sqlx::query(sql), bind_mysql_param)
}

pub(crate) fn postgres_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(sql), bind_postgres_param)
}

pub(crate) fn sqlite_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), bind_sqlite_param)
}

/// Bind a parameter into a MySQL `VALUES` tuple.
pub(crate) fn push_mysql_param<'args>(
    tuple: &mut Separated<'_, 'args, MySql, &'static str>,
    param: &'args QueryParam,
) {
    match param {
        QueryParam::Null => tuple.push_bind(None::<String>),
        QueryParam::Bool(v) => tuple.push_bind(*v),
        QueryParam::Int(v) => tuple.push_bind(*v),
        QueryParam::Float(v) => tuple.push_bind(*v),
        QueryParam::String(v) => tuple.push_bind(v.as_str()),
        QueryParam::Json(v) => tuple.push_bind(Json(v)),
    };
}

/// Bind a parameter into a PostgreSQL `VALUES` tuple.
pub(crate) fn push_postgres_param<'args>(
    tuple: &mut Separated<'_, 'args, Postgres, &'static str>,
    param: &'args QueryParam,
) {
    match param {
        QueryParam::Null => tuple.push_bind(None::<String>),
        QueryParam::Bool(v) => tuple.push_bind(*v),
        QueryParam::Int(v) => tuple.push_bind(*v),
        QueryParam::Float(v) => tuple.push_bind(*v),
        QueryParam::String(v) => tuple.push_bind(v.as_str()),
        QueryParam::Json(v) => tuple.push_bind(Json(v)),
    };
}

/// Bind a parameter into a SQLite `VALUES` tuple.
pub(crate) fn push_sqlite_param<'args>(
    tuple: &mut Separated<'_, 'args, Sqlite, &'static str>,
    param: &'args QueryParam,
) {
    match param {
        QueryParam::Null => tuple.push_bind(None::<String>),
        QueryParam::Bool(v) => tuple.push_bind(*v),
        QueryParam::Int(v) => tuple.push_bind(*v),
        QueryParam::Float(v) => tuple.push_bind(*v),
        QueryParam::String(v) => tuple.push_bind(v.as_str()),
        QueryParam::Json(v) => tuple.push_bind(v.to_string()),
    };
}
