//! Error types for the validation engine.
//!
//! Only two failures are ever run-fatal: discovery producing zero units and
//! an unusable configuration (e.g. an unwritable scratch directory). Every
//! other failure is caught at its own unit or trial boundary and converted
//! into result data, so one database's problems never abort another's
//! validation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fleetaudit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A candidate path could not be read or canonicalized during discovery
    #[error("Discovery failed for {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    /// Discovery completed but found no database units
    #[error("No database files discovered under {root}")]
    NoDatabases { root: PathBuf },

    /// A database file could not be opened
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Schema introspection failed after a successful open
    #[error("Schema introspection failed: {context}")]
    Introspection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backup or restore operation failed
    #[error("Backup operation failed: {context}")]
    Backup {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with AuditError
pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
    /// Creates a discovery error for a skipped path
    pub fn discovery(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connection error with context
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an introspection error with context
    pub fn introspection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Introspection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a backup error with context
    pub fn backup_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backup {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}
