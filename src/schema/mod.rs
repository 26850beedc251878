//! Schema validation for Resource and Metadata records.
//!
//! A namespace may store one JSON Schema document per record kind. Stored
//! documents are compiled on first use and cached per (namespace, kind).
//! Absence of a document means no validation.
//!
//! - `types`: compiled JSON Schema subset
//! - `validator`: item validation and usage counting
//! - `cache`: the shared validator cache

mod cache;
mod errors;
mod types;
mod validator;

pub use cache::{SchemaKind, SchemaSource, SchemaValidationCache};
pub use errors::{SchemaError, SchemaResult, ValidationDetails};
pub use types::{AdditionalProperties, JsonType, SchemaNode};
pub use validator::SchemaValidator;
