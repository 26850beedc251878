//! Data API facade
//!
//! One `DataApi` per namespace. It accepts bare primary keys or structured
//! item addresses, shapes responses, and delegates to:
//!
//! - the storage engine for item operations
//! - the control store for schemas and namespace metadata
//! - optional collaborators for lineage, search and export

mod address;
mod collaborators;
mod handler;
mod request;
mod response;

pub use address::{Addressing, ItemAddress};
pub use collaborators::{Collaborators, ExportProvider, LineageProvider, SearchProvider};
pub use handler::DataApi;
pub use request::{parse_delete, parse_find, parse_list, parse_reference, MasterOption, UpdateBody};
pub use response::{FindResponse, GetResponse, ItemView};
