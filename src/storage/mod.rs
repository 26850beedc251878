//! Backing store abstraction.
//!
//! The store offers single-item conditional updates, deletes, paged scans
//! with parallel segments, equality queries on secondary indexes, and a
//! per-table change stream. Two variants exist:
//!
//! - `MemoryBackend`: tables held in process memory
//! - `FileBackend`: memory tables made durable by a checksummed
//!   append-only log per table, replayed on open
//!
//! A conditional write either applies fully or leaves the item untouched.

mod checksum;
mod errors;
mod factory;
mod file;
mod index;
mod log;
mod memory;
mod record;
mod stream;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::Condition;

pub use checksum::{compute_checksum, segment_of, verify_checksum};
pub use errors::{BackendError, BackendResult};
pub use factory::open_backend;
pub use file::FileBackend;
pub use index::{IndexKey, SecondaryIndex};
pub use memory::MemoryBackend;
pub use stream::{ChangeStream, StreamEventName, StreamRecord};

/// A stored item: attribute name to JSON value
pub type Item = serde_json::Map<String, Value>;

/// Primary key of an item. Tables without a sort key leave `range` empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl ItemKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            range: None,
        }
    }

    pub fn with_range(hash: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            range: Some(range.into()),
        }
    }

    /// Extracts the key attributes of `item` for a table keyed by `spec`
    pub fn from_item(spec: &TableSpec, item: &Item) -> Option<Self> {
        let hash = item.get(&spec.hash_key)?.as_str()?.to_string();
        let range = match &spec.range_key {
            Some(name) => Some(item.get(name)?.as_str()?.to_string()),
            None => None,
        };
        Some(Self { hash, range })
    }

    /// Key attributes as an item fragment
    pub fn to_attributes(&self, spec: &TableSpec) -> Item {
        let mut attributes = Item::new();
        attributes.insert(spec.hash_key.clone(), Value::from(self.hash.clone()));
        if let (Some(name), Some(range)) = (&spec.range_key, &self.range) {
            attributes.insert(name.clone(), Value::from(range.clone()));
        }
        attributes
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}/{}", self.hash, range),
            None => write!(f, "{}", self.hash),
        }
    }
}

/// Indexed attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
    #[serde(rename = "B")]
    Binary,
}

impl AttributeType {
    /// Maps a configured type name: `number`/`int*` to N, `bin*` to B, else S
    pub fn from_config(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        if lower == "number" || lower.starts_with("int") {
            AttributeType::Number
        } else if lower.starts_with("bin") {
            AttributeType::Binary
        } else {
            AttributeType::String
        }
    }

    /// Whether a value of this JSON shape can be indexed under this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            AttributeType::String | AttributeType::Binary => value.is_string(),
            AttributeType::Number => value.is_number(),
        }
    }
}

/// Secondary index definition: equality lookups on one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub attribute: String,
    pub attribute_type: AttributeType,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, attribute: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into(),
            attribute_type,
        }
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub hash_key: String,
    #[serde(default)]
    pub range_key: Option<String>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key: hash_key.into(),
            range_key: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
        self.range_key = Some(range_key.into());
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn is_key_attribute(&self, attribute: &str) -> bool {
        attribute == self.hash_key || self.range_key.as_deref() == Some(attribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableStatus {
    Creating,
    Active,
    Deleting,
}

/// Point-in-time description of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub spec: TableSpec,
    pub status: TableStatus,
    pub table_id: String,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
    pub size_bytes: u64,
    /// Label of the table's change stream
    pub latest_stream_id: String,
}

/// Result of a completed backup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupDescription {
    pub backup_name: String,
    pub table: String,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A conditional single-item update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub key: ItemKey,
    /// `SET ... REMOVE ... ADD ...` with `#name`/`:value` placeholders
    pub expression: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, Value>,
    pub condition: Option<Condition>,
}

/// Item images around a successful update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutput {
    pub old: Option<Item>,
    pub new: Item,
}

/// One page of a scan. `limit` bounds the items evaluated, before filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub filter: Option<Condition>,
    pub limit: Option<usize>,
    /// `(segment, total_segments)`
    pub segment: Option<(u32, u32)>,
    pub exclusive_start_key: Option<ItemKey>,
}

/// One page of an equality query against a secondary index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub index: String,
    pub value: Value,
    pub filter: Option<Condition>,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<ItemKey>,
}

/// A page of results. `last_evaluated_key` is set when more may follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<ItemKey>,
    pub scanned_count: usize,
}

/// Operations every backing store provides
pub trait StorageBackend: Send + Sync {
    fn create_table(&self, spec: &TableSpec) -> BackendResult<TableDescription>;

    fn describe_table(&self, table: &str) -> BackendResult<TableDescription>;

    fn list_tables(&self) -> BackendResult<Vec<String>>;

    /// Adds an index to an existing table, backfilling it from current items
    fn create_index(&self, table: &str, index: &IndexSpec) -> BackendResult<()>;

    fn delete_table(&self, table: &str) -> BackendResult<()>;

    fn create_backup(&self, table: &str, backup_name: &str) -> BackendResult<BackupDescription>;

    fn get_item(&self, table: &str, key: &ItemKey) -> BackendResult<Option<Item>>;

    /// Applies the update if the condition holds, creating the item if absent
    fn update_item(&self, table: &str, request: &UpdateRequest) -> BackendResult<UpdateOutput>;

    /// Removes the item if the condition holds; returns the old image
    fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> BackendResult<Option<Item>>;

    fn scan(&self, table: &str, request: &ScanRequest) -> BackendResult<Page>;

    fn query(&self, table: &str, request: &QueryRequest) -> BackendResult<Page>;

    /// Change records with a sequence number greater than `after_sequence`
    fn stream_records(
        &self,
        table: &str,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> BackendResult<Vec<StreamRecord>>;
}

/// Approximate stored size of an item
pub fn item_size(item: &Item) -> u64 {
    serde_json::to_vec(item).map(|b| b.len() as u64).unwrap_or(0)
}
