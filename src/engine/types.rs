//! Request and response shapes of the storage engine.

use serde::Serialize;
use serde_json::Value;

use crate::config::DeleteMode;
use crate::storage::Item;

/// A Resource with its optional Metadata record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "Resource")]
    pub resource: Item,
    #[serde(rename = "Metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Item>,
}

/// Fields of an item update. Absent parts are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub resource: Option<Item>,
    pub metadata: Option<Item>,
    /// Attribute values the stored Resource must currently hold
    pub constraints: Option<Item>,
    /// Version the caller last read; checked when the namespace enforces OCCV
    pub item_version: Option<i64>,
    /// Recompile the stored schema for this request
    pub strict_schema_validation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateResponse {
    #[serde(rename = "Warnings", skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Value>,
}

/// What a delete removes.
///
/// - non-empty `resource`: only those Resource attributes
/// - `metadata` without `resource`: those Metadata attributes, or the whole
///   Metadata record when the list is empty
/// - otherwise the whole item, in `mode` if the namespace allows overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteRequest {
    pub resource: Option<Vec<String>>,
    pub metadata: Option<Vec<String>>,
    pub mode: Option<DeleteMode>,
}

impl DeleteRequest {
    pub fn whole_item() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: DeleteMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Per-id result of linking items to a master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMasterOutcome {
    pub id: String,
    pub updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub limit: Option<usize>,
    pub segment: Option<u32>,
    pub total_segments: Option<u32>,
    pub exclusive_start_key: Option<String>,
}

/// Equality search on exactly one of the two records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub resource: Option<Item>,
    pub metadata: Option<Item>,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<String>,
}

/// One page of items. No `last_evaluated_key` means no further pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemPage {
    #[serde(rename = "Items")]
    pub items: Vec<Item>,
    #[serde(rename = "LastEvaluatedKey", skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableUsage {
    pub size_bytes: u64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Usage {
    pub resource: TableUsage,
    pub metadata: TableUsage,
}

/// Table identifiers and latest change-stream labels of both tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamEndpoints {
    pub resource_table: String,
    pub resource_stream: String,
    pub metadata_table: String,
    pub metadata_stream: String,
}
