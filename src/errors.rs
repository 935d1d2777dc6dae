//! Error types for the lineup database builder
//!
//! Each component owns an error enum. Per-unit errors (a market or a station)
//! are classified by [`ApiError`] and never abort a run; store and registry
//! errors are fatal because they are the integrity backbone of the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a remote API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Valid empty result (terminal success for the unit)
    NotFound,
    /// Network or server-side failure, retried with backoff
    Transient,
    /// Malformed or unexpected response, isolated to the unit
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Remote lineup API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// The remote returned 404 or an empty result set
    #[error("No data for {resource}")]
    NotFound { resource: String },

    /// Timeout, refused connection, 429 or 5xx
    #[error("Transient failure fetching {resource}: {reason}")]
    Transient { resource: String, reason: String },

    /// Response could not be understood
    #[error("Unexpected response for {resource}: {reason}")]
    Fatal { resource: String, reason: String },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transient(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Error classification used by retry and failure bookkeeping
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Transient { .. } => ErrorKind::Transient,
            ApiError::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Only transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to encode a column value
    #[error("Failed to encode value for column {column}")]
    Encode {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Database file could not be prepared
    #[error("Database path not usable: {path}")]
    InvalidPath { path: PathBuf },
}

/// Checkpoint registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// File I/O failure
    #[error("Registry I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry document is not valid JSON
    #[error("Registry document {path} is corrupt")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Journal line could not be decoded
    #[error("Registry journal {path} is corrupt at line {line}")]
    CorruptJournal { path: PathBuf, line: usize },

    /// Serialization of the registry failed
    #[error("Failed to serialize registry")]
    Serialize(#[from] serde_json::Error),

    /// Atomic rename of the snapshot failed
    #[error("Failed to persist registry snapshot to {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported document version
    #[error("Unsupported registry version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Market file errors
#[derive(Error, Debug)]
pub enum MarketSourceError {
    /// File does not exist
    #[error("Markets file not found: {path}")]
    NotFound { path: PathBuf },

    /// I/O error reading the file
    #[error("I/O error reading markets file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Line does not contain `country,postal_code`
    #[error("Invalid market at line {line}: {content:?}. Expected country,postal_code")]
    InvalidFormat { line: usize, content: String },

    /// File contained no markets
    #[error("Markets file {path} contains no markets")]
    Empty { path: PathBuf },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Could not locate the user configuration directory
    #[error("Could not determine user config directory")]
    NoConfigDir,
}

impl ConfigError {
    pub fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Coordinator and worker orchestration errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Configuration rejected before start
    #[error("Invalid coordinator configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A task panicked or was cancelled by the runtime
    #[error("{task} terminated unexpectedly: {reason}")]
    TaskFailed { task: String, reason: String },

    /// Remote server did not answer the startup probe
    #[error("Server {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    MarketSource(#[from] MarketSourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Api(_) => "api",
            AppError::Store(_) => "store",
            AppError::Registry(_) => "registry",
            AppError::MarketSource(_) => "markets",
            AppError::Config(_) => "config",
            AppError::Coordinator(_) => "coordinator",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Remote API result type alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Registry result type alias
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Market source result type alias
pub type MarketResult<T> = std::result::Result<T, MarketSourceError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classification() {
        assert_eq!(ApiError::not_found("x").kind(), ErrorKind::NotFound);
        assert!(!ApiError::not_found("x").is_retryable());
        assert!(ApiError::transient("x", "timeout").is_retryable());
        assert!(!ApiError::fatal("x", "bad json").is_retryable());
    }

    #[test]
    fn test_app_error_category() {
        let err = AppError::from(ApiError::transient("lineups", "503"));
        assert_eq!(err.category(), "api");
        assert!(err.is_recoverable());

        let err = AppError::from(MarketSourceError::Empty {
            path: PathBuf::from("markets.csv"),
        });
        assert_eq!(err.category(), "markets");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        assert_eq!(ErrorKind::Transient.to_string(), "transient");
    }
}
