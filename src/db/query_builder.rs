//! Dialect-aware SQL text helpers.
//!
//! Nothing here parses SQL. Pagination appends a clause to the caller's text
//! as-is, and identical inputs always produce identical output.

use crate::models::DatabaseType;
use std::fmt;

/// SQL dialects the pagination and quoting helpers know about.
///
/// SQL Server and Oracle have no pooled engine in this crate; they exist so
/// callers can render text for those backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    MySql,
    SqlServer,
    /// Oracle 12c and later.
    Oracle,
}

impl SqlDialect {
    /// Positional placeholder for the `n`th (1-based) parameter.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            Self::SqlServer => format!("@p{}", n),
            Self::Oracle => format!(":{}", n),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }

    /// Quote an identifier, doubling any embedded quote characters.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", identifier.replace('`', "``")),
            Self::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
            Self::Sqlite | Self::Postgres | Self::Oracle => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        }
    }

    fn uses_offset_fetch(&self) -> bool {
        matches!(self, Self::SqlServer | Self::Oracle)
    }
}

impl From<DatabaseType> for SqlDialect {
    fn from(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::SQLite => Self::Sqlite,
            DatabaseType::PostgreSQL => Self::Postgres,
            DatabaseType::MySQL => Self::MySql,
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::SqlServer => "SQL Server",
            Self::Oracle => "Oracle",
        };
        f.write_str(name)
    }
}

/// Append the dialect's pagination clause to `base_query`.
///
/// The base text is kept verbatim, so a caller-supplied terminator ends up
/// before the clause. SQL Server requires the base query to carry its own
/// `ORDER BY`.
pub fn build_paginated_query(
    base_query: &str,
    offset: u64,
    limit: u64,
    dialect: SqlDialect,
) -> String {
    if dialect.uses_offset_fetch() {
        format!("{base_query} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
    } else {
        format!("{base_query} LIMIT {limit} OFFSET {offset}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset_dialects() {
        for dialect in [SqlDialect::Sqlite, SqlDialect::Postgres, SqlDialect::MySql] {
            assert_eq!(
                build_paginated_query("SELECT * FROM users ORDER BY id", 20, 10, dialect),
                "SELECT * FROM users ORDER BY id LIMIT 10 OFFSET 20"
            );
        }
    }

    #[test]
    fn test_offset_fetch_dialects() {
        assert_eq!(
            build_paginated_query("SELECT * FROM users ORDER BY id", 0, 5, SqlDialect::SqlServer),
            "SELECT * FROM users ORDER BY id OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(
            build_paginated_query("SELECT * FROM users ORDER BY id", 40, 20, SqlDialect::Oracle),
            "SELECT * FROM users ORDER BY id OFFSET 40 ROWS FETCH NEXT 20 ROWS ONLY"
        );
    }

    #[test]
    fn test_trailing_text_kept_verbatim() {
        assert_eq!(
            build_paginated_query("SELECT * FROM t;  ", 0, 5, SqlDialect::Sqlite),
            "SELECT * FROM t;   LIMIT 5 OFFSET 0"
        );
        assert_eq!(
            build_paginated_query("SELECT 1\n", 3, 1, SqlDialect::SqlServer),
            "SELECT 1\n OFFSET 3 ROWS FETCH NEXT 1 ROWS ONLY"
        );
    }

    #[test]
    fn test_base_text_not_rewritten() {
        let base = "select  *  from T where name = 'a;b'";
        let out = build_paginated_query(base, 1, 2, SqlDialect::Postgres);
        assert!(out.starts_with(base));
        assert_eq!(out, build_paginated_query(base, 1, 2, SqlDialect::Postgres));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::Postgres.placeholder(2), "$2");
        assert_eq!(SqlDialect::MySql.placeholder(2), "?");
        assert_eq!(SqlDialect::SqlServer.placeholder(1), "@p1");
        assert_eq!(SqlDialect::Oracle.placeholder(3), ":3");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlDialect::MySql.quote_identifier("user`s"), "`user``s`");
        assert_eq!(SqlDialect::Sqlite.quote_identifier("t"), "\"t\"");
        assert_eq!(SqlDialect::SqlServer.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_from_database_type() {
        assert_eq!(SqlDialect::from(DatabaseType::PostgreSQL), SqlDialect::Postgres);
        assert_eq!(SqlDialect::from(DatabaseType::SQLite).to_string(), "SQLite");
    }
}
