//! dataapi - storage and consistency core for namespaced data APIs
//!
//! Each namespace stores items as a Resource record and a Metadata record
//! in a keyed backing store. The core turns CRUD and search requests into
//! conditional single-item writes, enforcing versioning, schema and
//! item-master rules along the way.
//!
//! Entry point: [`cache::InstanceCache`], which hydrates one
//! [`api::DataApi`] per namespace.

pub mod api;
pub mod cache;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod expression;
pub mod observability;
pub mod params;
pub mod schema;
pub mod storage;

pub use cache::InstanceCache;
pub use error::{DataApiError, DataApiResult, ErrorKind};
