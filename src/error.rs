//! Error taxonomy for the data API core.
//!
//! Every failure surfaces as one of five classes:
//! - ResourceNotFound: missing or deleted item, bad address
//! - InvalidArguments: malformed request, schema failure, disallowed restore, master mismatch
//! - ConstraintViolation: a conditional write precondition failed
//! - UnimplementedFeature: capability not configured for the namespace
//! - Internal: unexpected backend or dependency failure

use serde_json::Value;
use thiserror::Error;

use crate::storage::BackendError;

/// Result type for data API operations
pub type DataApiResult<T> = Result<T, DataApiError>;

/// Error classes exposed to the request router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceNotFound,
    InvalidArguments,
    ConstraintViolation,
    UnimplementedFeature,
    Internal,
}

impl ErrorKind {
    /// Stable string code for this class
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::InvalidArguments => "INVALID_ARGUMENTS",
            ErrorKind::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorKind::UnimplementedFeature => "UNIMPLEMENTED_FEATURE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP-style status for transports that need one
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::ResourceNotFound => 404,
            ErrorKind::InvalidArguments => 400,
            ErrorKind::ConstraintViolation => 409,
            ErrorKind::UnimplementedFeature => 501,
            ErrorKind::Internal => 500,
        }
    }
}

/// Data API errors
#[derive(Debug, Error)]
pub enum DataApiError {
    /// Item missing, deleted, or addressed outside this namespace
    #[error("Resource Not Found: {0}")]
    ResourceNotFound(String),

    /// Request rejected before touching storage
    #[error("Invalid Arguments: {0}")]
    InvalidArguments(String),

    /// Conditional write precondition failed
    #[error("Constraint Violation: {0}")]
    ConstraintViolation(String),

    /// Capability not configured for this namespace
    #[error("Unimplemented Feature: {0}")]
    UnimplementedFeature(String),

    /// Unexpected failure with optional structured detail
    #[error("General Exception: {message}")]
    Detailed {
        message: String,
        detail: Option<Value>,
    },

    /// Backing store failure
    #[error("Storage failure: {0}")]
    Storage(#[from] BackendError),
}

impl DataApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        DataApiError::ResourceNotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DataApiError::InvalidArguments(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        DataApiError::ConstraintViolation(message.into())
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        DataApiError::UnimplementedFeature(message.into())
    }

    pub fn detailed(message: impl Into<String>, detail: Option<Value>) -> Self {
        DataApiError::Detailed {
            message: message.into(),
            detail,
        }
    }

    /// Returns the taxonomy class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataApiError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            DataApiError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            DataApiError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            DataApiError::UnimplementedFeature(_) => ErrorKind::UnimplementedFeature,
            DataApiError::Detailed { .. } | DataApiError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}
