//! Backing store error types
//!
//! Error codes:
//! - DAPI_CONDITIONAL_CHECK_FAILED: condition rejected the write, nothing changed
//! - DAPI_TABLE_NOT_FOUND / DAPI_TABLE_EXISTS / DAPI_INDEX_NOT_FOUND
//! - DAPI_BACKEND_VALIDATION: malformed expression or key
//! - DAPI_BACKEND_IO: disk I/O failure
//! - DAPI_DATA_CORRUPTION: checksum failure while replaying a table log

use std::io;

use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The write condition evaluated false; holds the rendered condition
    #[error("The conditional request failed: {0}")]
    ConditionalCheckFailed(String),

    #[error("Requested resource not found: table {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    /// Malformed expression, key or request
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("Data corruption in {path} at byte offset {offset}: {reason}")]
    Corruption {
        path: String,
        offset: u64,
        reason: String,
    },

    #[error("Backend state lock poisoned")]
    LockPoisoned,
}

impl BackendError {
    pub fn validation(message: impl Into<String>) -> Self {
        BackendError::Validation(message.into())
    }

    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        BackendError::Io {
            message: message.into(),
            source,
        }
    }

    pub fn corruption(path: impl Into<String>, offset: u64, reason: impl Into<String>) -> Self {
        BackendError::Corruption {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::ConditionalCheckFailed(_) => "DAPI_CONDITIONAL_CHECK_FAILED",
            BackendError::TableNotFound(_) => "DAPI_TABLE_NOT_FOUND",
            BackendError::TableExists(_) => "DAPI_TABLE_EXISTS",
            BackendError::IndexNotFound { .. } => "DAPI_INDEX_NOT_FOUND",
            BackendError::Validation(_) => "DAPI_BACKEND_VALIDATION",
            BackendError::Io { .. } => "DAPI_BACKEND_IO",
            BackendError::Corruption { .. } => "DAPI_DATA_CORRUPTION",
            BackendError::LockPoisoned => "DAPI_LOCK_POISONED",
        }
    }

    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, BackendError::ConditionalCheckFailed(_))
    }

    /// Corruption halts the table; everything else fails one operation
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Corruption { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for BackendError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        BackendError::LockPoisoned
    }
}
