//! Optional external collaborators of a namespace.
//!
//! Lineage, search and export live outside the core. A namespace without
//! the relevant collaborator answers those operations with
//! UnimplementedFeature.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::TableKind;
use crate::error::DataApiResult;
use crate::storage::Item;

/// Graph store of references between item addresses
pub trait LineageProvider: Send + Sync {
    fn create_reference(&self, from: &str, to: &str, properties: &Item) -> DataApiResult<()>;

    /// Items that `address` references, up to `depth` hops. `None` if unknown.
    fn downstream(&self, address: &str, depth: u32) -> DataApiResult<Option<Value>>;

    /// Items referencing `address`, up to `depth` hops. `None` if unknown.
    fn upstream(&self, address: &str, depth: u32) -> DataApiResult<Option<Value>>;

    /// Endpoint reported by the namespace's endpoints listing
    fn endpoint(&self) -> Option<String> {
        None
    }
}

/// Full-text search over delivered copies of a table
pub trait SearchProvider: Send + Sync {
    fn search(&self, table: &str, kind: TableKind, query: &Value) -> DataApiResult<Value>;
}

/// Bulk export of a table to external storage
pub trait ExportProvider: Send + Sync {
    fn start_export(&self, table: &str, options: &Value) -> DataApiResult<Value>;

    fn export_status(&self, job_name: &str, run_id: &str) -> DataApiResult<Value>;
}

#[derive(Clone, Default)]
pub struct Collaborators {
    pub lineage: Option<Arc<dyn LineageProvider>>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub export: Option<Arc<dyn ExportProvider>>,
}

impl Collaborators {
    pub fn with_lineage(mut self, lineage: Arc<dyn LineageProvider>) -> Self {
        self.lineage = Some(lineage);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_export(mut self, export: Arc<dyn ExportProvider>) -> Self {
        self.export = Some(export);
        self
    }
}
