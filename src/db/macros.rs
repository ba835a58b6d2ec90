//! Database dispatch macros for reducing code duplication.
//!
//! These macros expand one body per engine so each arm is type-checked
//! against that engine's own pool, connection and argument types.

/// Macro for generating database dispatch match arms over `DbPool`.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Run the same body against whichever engine connection a `ConnRef` holds.
///
/// `$query` is bound to the engine's `sqlx::query` + parameter binding helper,
/// so the body can be written once.
///
/// ```ignore
/// impl_conn_dispatch!(conn, |c, query| {
///     query(sql, params).execute(&mut *c).await
/// })
/// ```
#[macro_export]
macro_rules! impl_conn_dispatch {
    ($conn:expr, |$c:ident, $query:ident| $body:expr) => {
        match $conn {
            $crate::db::executor::ConnRef::MySql($c) => {
                use $crate::db::params::mysql_query as $query;
                $body
            }
            $crate::db::executor::ConnRef::Postgres($c) => {
                use $crate::db::params::postgres_query as $query;
                $body
            }
            $crate::db::executor::ConnRef::SQLite($c) => {
                use $crate::db::params::sqlite_query as $query;
                $body
            }
        }
    };
}

pub use impl_conn_dispatch;
pub use impl_db_dispatch;
