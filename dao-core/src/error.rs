//! Structured error types for dao-core.
//!
//! Uses `thiserror` so library consumers get matchable errors.
//! The `dao` binary wraps these in `anyhow` for context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::tls::TlsError;

/// Main error type for dao-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Config file could not be read or written
    #[error("Config I/O error at {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for `DatabaseConfig`
    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Default config could not be encoded
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Config parsed but violates an invariant
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// `type` is neither mysql nor postgres
    #[error("Invalid db.type in config file: '{0}'; must be 'mysql'")]
    InvalidDriverType(String),

    /// TLS profile could not be built
    #[error("Failed to get client TLS for MySQL: {0}")]
    Tls(#[from] TlsError),

    /// Datasource string could not be understood
    #[error("Invalid datasource: {reason}")]
    InvalidDataSource { reason: String },

    /// Server stayed unreachable after every retry
    #[error("Failed to connect to MySQL database after {attempts} attempts: {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Database or table provisioning failed
    #[error("Schema error: {reason}")]
    Schema {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Statement failed on an open handle
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Handle has no live pool (never opened, stub driver, or closed)
    #[error("sqlx handle not initialized")]
    NotInitialized,
}

/// Result type alias for dao-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn invalid_data_source(reason: impl Into<String>) -> Self {
        Self::InvalidDataSource {
            reason: reason.into(),
        }
    }

    /// Schema error without an underlying driver error
    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn schema_with(reason: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Schema {
            reason: reason.into(),
            source: Some(source),
        }
    }
}
