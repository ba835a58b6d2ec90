//! Connection-related data models.
//!
//! This module defines the backend families, relational engines and
//! credential types a provider is configured with.

use serde::{Deserialize, Serialize};

/// The four structurally different store families a provider can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFamily {
    /// SQL engine reached through a pooled connection.
    Relational,
    KeyValue,
    Document,
    /// Bucket-oriented store (keys addressed inside a named bucket).
    Bucket,
}

impl BackendFamily {
    /// Detect the family from a connection string scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        if DatabaseType::from_connection_string(connection_string).is_some() {
            return Some(Self::Relational);
        }
        let lower = connection_string.to_lowercase();
        if lower.starts_with("redis://") || lower.starts_with("kv://") {
            Some(Self::KeyValue)
        } else if lower.starts_with("mongodb://") || lower.starts_with("document://") {
            Some(Self::Document)
        } else if lower.starts_with("couchbase://") || lower.starts_with("bucket://") {
            Some(Self::Bucket)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::KeyValue => "key-value",
            Self::Document => "document",
            Self::Bucket => "bucket",
        }
    }
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Supported relational engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Username/password pair for backends that authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    /// Sensitive - never logged
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Lifecycle of a provider. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninitialized,
    Connected,
    Closed,
}

impl ProviderState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Connected => 1,
            Self::Closed => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_detection() {
        assert_eq!(
            BackendFamily::from_connection_string("sqlite:/tmp/a.db"),
            Some(BackendFamily::Relational)
        );
        assert_eq!(
            BackendFamily::from_connection_string("postgres://u:p@h/db"),
            Some(BackendFamily::Relational)
        );
        assert_eq!(
            BackendFamily::from_connection_string("redis://localhost:6379"),
            Some(BackendFamily::KeyValue)
        );
        assert_eq!(
            BackendFamily::from_connection_string("mongodb://h/app"),
            Some(BackendFamily::Document)
        );
        assert_eq!(
            BackendFamily::from_connection_string("couchbase://h/travel"),
            Some(BackendFamily::Bucket)
        );
        assert_eq!(BackendFamily::from_connection_string("ftp://h"), None);
    }

    #[test]
    fn test_database_type_detection() {
        assert_eq!(
            DatabaseType::from_connection_string("MariaDB://h/app"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("postgresql://h/app"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_connection_string("redis://h"), None);
        assert_eq!(DatabaseType::SQLite.to_string(), "SQLite");
    }

    #[test]
    fn test_credentials_debug_masks_password() {
        let creds = Credentials::new("admin", "s3cret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_state_round_trip_through_u8() {
        for state in [
            ProviderState::Uninitialized,
            ProviderState::Connected,
            ProviderState::Closed,
        ] {
            assert_eq!(ProviderState::from_u8(state.as_u8()), state);
        }
    }
}
