//! Error types for the provider layer.
//!
//! Every error that crosses the provider boundary names the operation that
//! failed and, where one exists, the record id, table or query text it
//! targeted, so a caller can log it without extra bookkeeping.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed during {operation}: {message}")]
    Connection {
        operation: String,
        message: String,
        suggestion: String,
    },

    #[error("Pool exhausted: {operation} waited {timeout_ms}ms without a free connection")]
    PoolExhausted { operation: String, timeout_ms: u64 },

    #[error("Backend error during {operation} (target: {target}): {message}")]
    BackendExecution {
        operation: String,
        target: String,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Duplicate key '{id}' rejected during {operation}")]
    DuplicateKey { operation: String, id: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Provider is closed: {operation} is not allowed")]
    Closed { operation: String },

    #[error("{operation} is not supported by the {family} backend family")]
    Unsupported { operation: String, family: String },
}

impl ProviderError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        operation: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            operation: operation.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::PoolExhausted {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a backend execution error, preserving the native message.
    pub fn backend(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
        sql_state: Option<String>,
    ) -> Self {
        Self::BackendExecution {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
            sql_state,
        }
    }

    /// Create a duplicate key error.
    pub fn duplicate_key(operation: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateKey {
            operation: operation.into(),
            id: id.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a closed-provider error.
    pub fn closed(operation: impl Into<String>) -> Self {
        Self::Closed {
            operation: operation.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, family: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            family: family.into(),
        }
    }

    /// Rewrite the operation and target carried by this error.
    ///
    /// Errors converted from driver errors start out with a generic operation
    /// name; call sites use this to attach what they were actually doing.
    pub fn with_context(self, op: &str, tgt: &str) -> Self {
        match self {
            Self::Connection {
                message,
                suggestion,
                ..
            } => Self::Connection {
                operation: op.to_string(),
                message,
                suggestion,
            },
            Self::PoolExhausted { timeout_ms, .. } => Self::PoolExhausted {
                operation: op.to_string(),
                timeout_ms,
            },
            Self::BackendExecution {
                message, sql_state, ..
            } => Self::BackendExecution {
                operation: op.to_string(),
                target: tgt.to_string(),
                message,
                sql_state,
            },
            Self::DuplicateKey { .. } => Self::DuplicateKey {
                operation: op.to_string(),
                id: tgt.to_string(),
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if a caller may reasonably retry. This layer never retries itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }
}

/// Convert sqlx errors to ProviderError.
impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        const OP: &str = "database call";
        match err {
            sqlx::Error::Configuration(msg) => ProviderError::connection(
                OP,
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return ProviderError::duplicate_key(OP, "");
                }
                let code = db_err.code().map(|c| c.to_string());
                ProviderError::backend(OP, "", db_err.message(), code)
            }
            sqlx::Error::RowNotFound => ProviderError::backend(OP, "", "No rows returned", None),
            sqlx::Error::PoolTimedOut => ProviderError::pool_exhausted(OP, 0),
            sqlx::Error::PoolClosed => {
                ProviderError::connection(OP, "Connection pool is closed", "Reconnect the provider")
            }
            sqlx::Error::Io(io_err) => ProviderError::connection(
                OP,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ProviderError::connection(
                OP,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ProviderError::connection(
                OP,
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                ProviderError::backend(OP, col.clone(), format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => ProviderError::backend(
                OP,
                "",
                format!("Failed to decode column {}: {}", index, source),
                None,
            ),
            sqlx::Error::Decode(source) => {
                ProviderError::backend(OP, "", format!("Decode error: {}", source), None)
            }
            sqlx::Error::WorkerCrashed => ProviderError::connection(
                OP,
                "Database worker crashed",
                "Reconnect the provider",
            ),
            _ => ProviderError::backend(OP, "", format!("Unknown database error: {}", err), None),
        }
    }
}

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Attach operation and target context while converting driver errors.
pub(crate) trait ResultExt<T> {
    fn context(self, operation: &str, target: &str) -> ProviderResult<T>;
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, operation: &str, target: &str) -> ProviderResult<T> {
        self.map_err(|e| ProviderError::from(e).with_context(operation, target))
    }
}

impl<T> ResultExt<T> for ProviderResult<T> {
    fn context(self, operation: &str, target: &str) -> ProviderResult<T> {
        self.map_err(|e| e.with_context(operation, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::connection("connect", "refused", "Check the host");
        assert!(err.to_string().contains("Connection failed during connect"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = ProviderError::connection("get", "refused", "Check the host");
        assert_eq!(err.suggestion(), Some("Check the host"));
        assert!(ProviderError::configuration("bad").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(ProviderError::pool_exhausted("acquire", 100).is_retryable());
        assert!(ProviderError::connection("get", "err", "sugg").is_retryable());
        assert!(!ProviderError::configuration("empty host").is_retryable());
        assert!(!ProviderError::duplicate_key("insert", "k1").is_retryable());
    }

    #[test]
    fn test_with_context_rewrites_backend_target() {
        let err = ProviderError::backend("database call", "", "no such table: t", None)
            .with_context("execute_batch_insert", "INSERT INTO t VALUES (?)");
        match err {
            ProviderError::BackendExecution {
                operation,
                target,
                message,
                ..
            } => {
                assert_eq!(operation, "execute_batch_insert");
                assert_eq!(target, "INSERT INTO t VALUES (?)");
                assert_eq!(message, "no such table: t");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_with_context_sets_duplicate_id() {
        let err = ProviderError::duplicate_key("database call", "").with_context("insert", "user:1");
        assert!(matches!(
            err,
            ProviderError::DuplicateKey { ref operation, ref id } if operation == "insert" && id == "user:1"
        ));
    }

    #[test]
    fn test_with_context_keeps_configuration() {
        let err = ProviderError::configuration("empty path").with_context("get", "k");
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn test_pool_timeout_maps_to_pool_exhausted() {
        let err: ProviderError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ProviderError::PoolExhausted { .. }));
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: ProviderError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }
}
