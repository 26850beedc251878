//! The storage and consistency core of one namespace.
//!
//! A `StorageEngine` owns no item state. Every mutation is a single
//! conditional update against the backing store, so concurrent requests
//! are serialized by the store, never by the engine.
//!
//! - `provision`: tables and indexes
//! - `write`: update, delete, restore, item-master linkage
//! - `read`: list and find with pagination

mod provision;
mod read;
mod types;
mod write;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::{DataApiSettings, NamespaceConfig};
use crate::error::{DataApiError, DataApiResult};
use crate::expression::Condition;
use crate::observability::{log_event_with_fields, trace_event, Event, MetricsRegistry};
use crate::params;
use crate::schema::SchemaValidationCache;
use crate::storage::{BackupDescription, Item, ItemKey, StorageBackend, StreamRecord};

pub use provision::{ensure_table, index_specs, wait_until_active, ProvisionWait};
pub use types::{
    DeleteRequest, FindRequest, ItemMasterOutcome, ItemPage, ItemRecord, ItemUpdate, ListRequest,
    StreamEndpoints, TableUsage, UpdateResponse, Usage,
};

/// Which of a namespace's two tables an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Resource,
    Metadata,
}

pub struct StorageEngine {
    backend: Arc<dyn StorageBackend>,
    config: NamespaceConfig,
    resource_table: String,
    metadata_table: String,
    max_response_size: usize,
    schemas: Arc<SchemaValidationCache>,
    metrics: Arc<MetricsRegistry>,
}

impl StorageEngine {
    /// Provisions the namespace's tables and indexes, then returns the engine
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        config: NamespaceConfig,
        settings: &DataApiSettings,
        schemas: Arc<SchemaValidationCache>,
        metrics: Arc<MetricsRegistry>,
    ) -> DataApiResult<Self> {
        config.validate()?;
        let resource_table = config.table_name();
        let metadata_table = config.metadata_table_name();
        let wait = ProvisionWait {
            interval: settings.provision_poll_interval(),
            timeout: settings.provision_timeout(),
        };

        ensure_table(
            backend.as_ref(),
            &resource_table,
            &config.primary_key,
            &index_specs(&resource_table, &config.table_indexes, Some(&resource_table)),
            wait,
        )?;
        ensure_table(
            backend.as_ref(),
            &metadata_table,
            &config.primary_key,
            &index_specs(&metadata_table, &config.metadata_indexes, None),
            wait,
        )?;

        log_event_with_fields(
            Event::TableProvisioned,
            &[
                ("api", config.api_name.as_str()),
                ("resource_table", resource_table.as_str()),
                ("metadata_table", metadata_table.as_str()),
            ],
        );

        Ok(Self {
            backend,
            config,
            resource_table,
            metadata_table,
            max_response_size: settings.max_response_size.max(1),
            schemas,
            metrics,
        })
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    pub fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    pub fn resource_table(&self) -> &str {
        &self.resource_table
    }

    pub fn metadata_table(&self) -> &str {
        &self.metadata_table
    }

    fn table(&self, kind: TableKind) -> &str {
        match kind {
            TableKind::Resource => &self.resource_table,
            TableKind::Metadata => &self.metadata_table,
        }
    }

    /// Reads one record. Deleted records are hidden unless `force` is set.
    pub(crate) fn fetch(&self, kind: TableKind, key: &str, force: bool) -> DataApiResult<Option<Item>> {
        let item = self.backend.get_item(self.table(kind), &ItemKey::new(key))?;
        self.metrics.increment_items_read();
        Ok(item.filter(|item| force || !is_deleted(item)))
    }

    /// The item's Metadata record without its key attribute
    fn fetch_meta(&self, id: &str) -> DataApiResult<Option<Item>> {
        let mut meta = self.fetch(TableKind::Metadata, &params::meta_id(id), false)?;
        if let Some(meta) = meta.as_mut() {
            meta.remove(&self.config.primary_key);
        }
        Ok(meta)
    }

    /// Fails with ResourceNotFound unless a live Resource exists
    pub fn check(&self, id: &str) -> DataApiResult<()> {
        match self.fetch(TableKind::Resource, id, false)? {
            Some(_) => Ok(()),
            None => Err(DataApiError::not_found(format!("Invalid ID {}", id))),
        }
    }

    pub fn get(&self, id: &str, with_metadata: bool) -> DataApiResult<ItemRecord> {
        let resource = self
            .fetch(TableKind::Resource, id, false)?
            .ok_or_else(|| DataApiError::not_found(format!("Invalid ID {}", id)))?;
        let metadata = if with_metadata { self.fetch_meta(id)? } else { None };
        trace_event(Event::ItemRead, &[("table", self.resource_table.as_str()), ("id", id)]);
        Ok(ItemRecord {
            id: id.to_string(),
            resource,
            metadata,
        })
    }

    /// Metadata of a live item
    pub fn get_metadata(&self, id: &str) -> DataApiResult<Option<Item>> {
        self.check(id)?;
        self.fetch_meta(id)
    }

    pub fn usage(&self) -> DataApiResult<Usage> {
        let usage = |table: &str| -> DataApiResult<TableUsage> {
            let description = self.backend.describe_table(table)?;
            Ok(TableUsage {
                size_bytes: description.size_bytes,
                count: description.item_count,
            })
        };
        Ok(Usage {
            resource: usage(&self.resource_table)?,
            metadata: usage(&self.metadata_table)?,
        })
    }

    pub fn streams(&self) -> DataApiResult<StreamEndpoints> {
        let resource = self.backend.describe_table(&self.resource_table)?;
        let metadata = self.backend.describe_table(&self.metadata_table)?;
        Ok(StreamEndpoints {
            resource_table: resource.table_id,
            resource_stream: resource.latest_stream_id,
            metadata_table: metadata.table_id,
            metadata_stream: metadata.latest_stream_id,
        })
    }

    /// Change records of one table after `after_sequence`
    pub fn stream_records(
        &self,
        kind: TableKind,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> DataApiResult<Vec<StreamRecord>> {
        Ok(self.backend.stream_records(self.table(kind), after_sequence, limit)?)
    }

    /// Deletes both tables, first backing each up as `<table>-final-<timestamp>` when asked
    pub fn drop_tables(&self, backup: bool) -> DataApiResult<Vec<BackupDescription>> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let mut backups = Vec::new();
        for table in [&self.resource_table, &self.metadata_table] {
            if backup {
                backups.push(self.backend.create_backup(table, &format!("{}-final-{}", table, stamp))?);
            }
            self.backend.delete_table(table)?;
        }
        log_event_with_fields(
            Event::NamespaceDropped,
            &[
                ("api", self.config.api_name.as_str()),
                ("backups", if backup { "true" } else { "false" }),
            ],
        );
        Ok(backups)
    }
}

/// `Deleted` is set and not zero
pub(crate) fn is_deleted(item: &Item) -> bool {
    !Condition::not_deleted().evaluate(Some(item))
}

/// The master an item is linked to, if any
pub(crate) fn master_of(item: &Item) -> Option<&str> {
    item.get(params::ITEM_MASTER_ID).and_then(Value::as_str)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DataApiSettings;
    use crate::control::ApiMetadataStore;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    pub(crate) struct Fixture {
        pub backend: Arc<MemoryBackend>,
        pub control: Arc<ApiMetadataStore>,
        pub schemas: Arc<SchemaValidationCache>,
        pub engine: StorageEngine,
    }

    pub(crate) fn fixture_with(config: NamespaceConfig) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let control = Arc::new(ApiMetadataStore::new(backend.clone(), params::CONTROL_TABLE));
        control.verify_control_table().unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let schemas = Arc::new(SchemaValidationCache::new(control.clone(), metrics.clone()));
        let engine = StorageEngine::open(
            backend.clone(),
            config,
            &DataApiSettings::default(),
            schemas.clone(),
            metrics,
        )
        .unwrap();
        Fixture {
            backend,
            control,
            schemas,
            engine,
        }
    }

    pub(crate) fn fixture() -> Fixture {
        let mut config = NamespaceConfig::new("orders", "id");
        config.table_indexes = vec![crate::config::IndexDefinition::parse("color").unwrap()];
        fixture_with(config)
    }

    pub(crate) fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    pub(crate) fn put(engine: &StorageEngine, id: &str, resource: Value) {
        engine
            .update(
                id,
                ItemUpdate {
                    resource: Some(item(resource)),
                    ..ItemUpdate::default()
                },
                "tester",
            )
            .unwrap();
    }

    #[test]
    fn test_open_provisions_tables_and_indexes() {
        let f = fixture();
        let resource = f.backend.describe_table("orders-dev").unwrap();
        let names: Vec<&str> = resource.spec.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["orders-dev-ItemMasterID", "orders-dev-color"]);
        assert!(f.backend.describe_table("orders-dev-Metadata").is_ok());
    }

    #[test]
    fn test_get_and_check() {
        let f = fixture();
        put(&f.engine, "A", json!({"color": "red"}));
        f.engine
            .update(
                "A",
                ItemUpdate {
                    metadata: Some(item(json!({"owner": "ops"}))),
                    ..ItemUpdate::default()
                },
                "tester",
            )
            .unwrap();

        f.engine.check("A").unwrap();
        let record = f.engine.get("A", true).unwrap();
        assert_eq!(record.resource["color"], json!("red"));
        let meta = record.metadata.unwrap();
        assert_eq!(meta["owner"], json!("ops"));
        assert!(!meta.contains_key("id"));

        assert!(f.engine.get("A", false).unwrap().metadata.is_none());
        assert_eq!(f.engine.get_metadata("A").unwrap().unwrap()["owner"], json!("ops"));
    }

    #[test]
    fn test_missing_item_not_found() {
        let f = fixture();
        assert_eq!(f.engine.check("nope").unwrap_err().kind(), crate::error::ErrorKind::ResourceNotFound);
        assert!(f.engine.get("nope", true).is_err());
        assert!(f.engine.get_metadata("nope").is_err());
    }

    #[test]
    fn test_usage_and_streams() {
        let f = fixture();
        put(&f.engine, "A", json!({"color": "red"}));
        let usage = f.engine.usage().unwrap();
        assert_eq!(usage.resource.count, 1);
        assert!(usage.resource.size_bytes > 0);
        assert_eq!(usage.metadata.count, 0);
        assert_eq!(
            serde_json::to_value(&usage).unwrap()["Resource"]["Count"],
            json!(1)
        );

        let streams = f.engine.streams().unwrap();
        assert!(streams.resource_stream.starts_with("orders-dev/stream/"));
        let records = f.engine.stream_records(TableKind::Resource, None, 10).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_drop_tables_with_backup() {
        let f = fixture();
        put(&f.engine, "A", json!({"color": "red"}));
        let backups = f.engine.drop_tables(true).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups[0].backup_name.starts_with("orders-dev-final-"));
        assert_eq!(backups[0].item_count, 1);
        assert!(f.backend.list_tables().unwrap().iter().all(|t| t == params::CONTROL_TABLE));
        assert_eq!(
            f.backend.backup_items(&backups[0].backup_name).unwrap().unwrap().len(),
            1
        );
    }
}
