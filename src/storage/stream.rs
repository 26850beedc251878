//! Per-table change stream.
//!
//! Every successful mutation appends one record carrying the old and new
//! images. Records are retained in memory and read by sequence number.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Item, ItemKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamEventName {
    Insert,
    Modify,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRecord {
    pub event_id: Uuid,
    pub sequence: u64,
    pub event_name: StreamEventName,
    pub keys: ItemKey,
    pub old_image: Option<Item>,
    pub new_image: Option<Item>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChangeStream {
    label: String,
    next_sequence: u64,
    records: Vec<StreamRecord>,
}

impl ChangeStream {
    pub fn new(table: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            label: format!("{}/stream/{}", table, created_at.format("%Y-%m-%dT%H:%M:%S%.3f")),
            next_sequence: 1,
            records: Vec::new(),
        }
    }

    /// Stream identifier, stable for the table's lifetime
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Records a mutation. Event name follows from which images are present.
    pub fn emit(&mut self, keys: &ItemKey, old_image: Option<Item>, new_image: Option<Item>) {
        let event_name = match (&old_image, &new_image) {
            (None, Some(_)) => StreamEventName::Insert,
            (Some(_), Some(_)) => StreamEventName::Modify,
            (_, None) => StreamEventName::Remove,
        };
        let record = StreamRecord {
            event_id: Uuid::new_v4(),
            sequence: self.next_sequence,
            event_name,
            keys: keys.clone(),
            old_image,
            new_image,
            created_at: Utc::now(),
        };
        self.next_sequence += 1;
        self.records.push(record);
    }

    pub fn read(&self, after_sequence: Option<u64>, limit: usize) -> Vec<StreamRecord> {
        let after = after_sequence.unwrap_or(0);
        self.records
            .iter()
            .filter(|r| r.sequence > after)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
