//! Schema error types
//!
//! - SCHEMA_INVALID: the schema document itself cannot be compiled
//! - SCHEMA_VALIDATION_FAILED: an item violates the compiled schema
//!
//! Both surface to callers as InvalidArguments.

use std::fmt;

use thiserror::Error;

use crate::error::DataApiError;

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Validation failure details
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationDetails {
    /// Path of the offending value (e.g., "$.address.city")
    pub path: String,
    /// Expected type or condition
    pub expected: String,
    /// What was found instead
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(path: impl Into<String>) -> Self {
        Self::new(path, "field to be present", "missing")
    }

    pub fn extra_field(path: impl Into<String>) -> Self {
        Self::new(path, "no undeclared fields", "extra field present")
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.path, self.expected, self.actual)
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid schema at {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("Schema validation failed: {0}")]
    Validation(ValidationDetails),
}

impl SchemaError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Invalid { .. } => "SCHEMA_INVALID",
            SchemaError::Validation(_) => "SCHEMA_VALIDATION_FAILED",
        }
    }

    pub fn details(&self) -> Option<&ValidationDetails> {
        match self {
            SchemaError::Validation(details) => Some(details),
            SchemaError::Invalid { .. } => None,
        }
    }
}

impl From<ValidationDetails> for SchemaError {
    fn from(details: ValidationDetails) -> Self {
        SchemaError::Validation(details)
    }
}

impl From<SchemaError> for DataApiError {
    fn from(err: SchemaError) -> Self {
        DataApiError::invalid(err.to_string())
    }
}
