//! Control-plane records: namespace configuration, schemas and status.
//!
//! One shared control table holds every namespace's records, keyed by
//! (`api` = `<api>-<stage>`, `type` ∈ {Meta, ResourceSchema, MetadataSchema}).
//! A schema document is nested under an attribute named after its record
//! type so it cannot collide with the key attributes.

use std::sync::Arc;

use serde_json::Value;

use crate::config::{NamespaceConfig, NamespaceStatus};
use crate::error::{DataApiError, DataApiResult};
use crate::expression::{decorate, AuditStamp, Condition, UpdateExpressionBuilder};
use crate::observability::{log_event_with_fields, Event};
use crate::params;
use crate::schema::{SchemaKind, SchemaSource, SchemaValidator};
use crate::storage::{BackendError, Item, ItemKey, ScanRequest, StorageBackend, TableSpec};

/// Record type of a namespace's configuration
pub const META_RECORD: &str = "Meta";

const STATUS_ATTRIBUTE: &str = "Status";

pub struct ApiMetadataStore {
    backend: Arc<dyn StorageBackend>,
    table: String,
}

impl ApiMetadataStore {
    pub fn new(backend: Arc<dyn StorageBackend>, control_table: impl Into<String>) -> Self {
        Self {
            backend,
            table: control_table.into(),
        }
    }

    pub fn control_table(&self) -> &str {
        &self.table
    }

    /// Creates the control table if it does not exist
    pub fn verify_control_table(&self) -> DataApiResult<()> {
        let created = match self.backend.describe_table(&self.table) {
            Ok(_) => false,
            Err(BackendError::TableNotFound(_)) => {
                let spec = TableSpec::new(&self.table, params::CONTROL_HASH).with_range_key(params::CONTROL_SORT);
                match self.backend.create_table(&spec) {
                    Ok(_) | Err(BackendError::TableExists(_)) => true,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };
        log_event_with_fields(
            Event::ControlTableVerified,
            &[
                ("table", self.table.as_str()),
                ("created", if created { "true" } else { "false" }),
            ],
        );
        Ok(())
    }

    /// The namespace's Meta record, projected to `filters` when given
    pub fn get_api_metadata(&self, namespace: &str, filters: Option<&[&str]>) -> DataApiResult<Option<Item>> {
        let Some(meta) = self.get_record(namespace, META_RECORD)? else {
            return Ok(None);
        };
        Ok(Some(match filters {
            None => meta,
            Some(filters) => filters
                .iter()
                .filter_map(|f| meta.get(*f).map(|v| (f.to_string(), v.clone())))
                .collect(),
        }))
    }

    pub fn get_namespace_config(&self, namespace: &str) -> DataApiResult<Option<NamespaceConfig>> {
        self.get_api_metadata(namespace, None)?
            .map(|meta| NamespaceConfig::from_value(Value::Object(meta)))
            .transpose()
    }

    /// Writes a namespace's full configuration as its Meta record
    pub fn create_metadata(&self, config: &NamespaceConfig, caller: &str) -> DataApiResult<Item> {
        config.validate()?;
        let Value::Object(fields) = config.to_value()? else {
            return Err(DataApiError::detailed("Namespace configuration is not an object", None));
        };
        self.write_record(&config.control_key(), META_RECORD, &fields, caller)
    }

    /// Merges `updates` into the Meta record. Returns `None` for an empty update.
    pub fn update_metadata(&self, namespace: &str, updates: &Item, caller: &str) -> DataApiResult<Option<Item>> {
        if updates.is_empty() {
            return Ok(None);
        }
        self.write_record(namespace, META_RECORD, updates, caller).map(Some)
    }

    pub fn set_status(&self, namespace: &str, status: NamespaceStatus, caller: &str) -> DataApiResult<Item> {
        let status = serde_json::to_value(status)
            .map_err(|e| DataApiError::detailed(format!("Unable to encode status: {}", e), None))?;
        let mut fields = Item::new();
        fields.insert(STATUS_ATTRIBUTE.to_string(), status);
        self.write_record(namespace, META_RECORD, &fields, caller)
    }

    pub fn get_api_status(&self, namespace: &str) -> DataApiResult<Option<NamespaceStatus>> {
        let Some(meta) = self.get_api_metadata(namespace, Some(&[STATUS_ATTRIBUTE][..]))? else {
            return Ok(None);
        };
        match meta.get(STATUS_ATTRIBUTE) {
            None => Ok(Some(NamespaceStatus::Active)),
            Some(status) => serde_json::from_value(status.clone())
                .map(Some)
                .map_err(|_| DataApiError::detailed(format!("Unknown status {} for {}", status, namespace), None)),
        }
    }

    /// Control keys of every configured namespace
    pub fn get_all_apis(&self) -> DataApiResult<Vec<String>> {
        let filter = Condition::equals(params::CONTROL_SORT, META_RECORD);
        let mut apis = Vec::new();
        let mut request = ScanRequest {
            filter: Some(filter),
            ..ScanRequest::default()
        };
        loop {
            let page = self.backend.scan(&self.table, &request)?;
            apis.extend(
                page.items
                    .iter()
                    .filter_map(|item| item.get(params::CONTROL_HASH)?.as_str().map(str::to_string)),
            );
            match page.last_evaluated_key {
                Some(key) => request.exclusive_start_key = Some(key),
                None => break,
            }
        }
        Ok(apis)
    }

    /// Namespace names deployed in `stage`
    pub fn get_registry(&self, stage: &str) -> DataApiResult<Vec<String>> {
        let suffix = format!("-{}", stage);
        Ok(self
            .get_all_apis()?
            .into_iter()
            .filter_map(|api| api.strip_suffix(&suffix).map(str::to_string))
            .collect())
    }

    /// The stored schema document, if any
    pub fn get_schema(&self, namespace: &str, kind: SchemaKind) -> DataApiResult<Option<Value>> {
        Ok(self
            .get_record(namespace, kind.record_type())?
            .and_then(|mut record| record.remove(kind.record_type())))
    }

    /// Stores a schema after checking it compiles
    pub fn put_schema(&self, namespace: &str, kind: SchemaKind, schema: Value, caller: &str) -> DataApiResult<Item> {
        SchemaValidator::compile(&schema, 0)?;
        let mut fields = Item::new();
        fields.insert(kind.record_type().to_string(), schema);
        self.write_record(namespace, kind.record_type(), &fields, caller)
    }

    /// Removes a schema; returns whether one was stored
    pub fn delete_schema(&self, namespace: &str, kind: SchemaKind) -> DataApiResult<bool> {
        self.delete_metadata(namespace, kind.record_type())
    }

    /// Removes one control record; returns whether it existed
    pub fn delete_metadata(&self, namespace: &str, record_type: &str) -> DataApiResult<bool> {
        Ok(self
            .backend
            .delete_item(&self.table, &ItemKey::with_range(namespace, record_type), None)?
            .is_some())
    }

    /// Removes the schema and Meta records of a namespace
    pub fn delete_all_api_metadata(&self, namespace: &str) -> DataApiResult<()> {
        self.delete_schema(namespace, SchemaKind::Resource)?;
        self.delete_schema(namespace, SchemaKind::Metadata)?;
        self.delete_metadata(namespace, META_RECORD)?;
        Ok(())
    }

    fn get_record(&self, namespace: &str, record_type: &str) -> DataApiResult<Option<Item>> {
        Ok(self
            .backend
            .get_item(&self.table, &ItemKey::with_range(namespace, record_type))?)
    }

    /// Unconditional SET-only merge with audit fields, no version increment
    fn write_record(&self, namespace: &str, record_type: &str, fields: &Item, caller: &str) -> DataApiResult<Item> {
        let mut builder = UpdateExpressionBuilder::new();
        for (name, value) in fields {
            let audit = matches!(
                name.as_str(),
                params::LAST_UPDATE_DATE | params::LAST_UPDATED_BY | params::LAST_UPDATE_ACTION
            );
            if audit || name == params::CONTROL_HASH || name == params::CONTROL_SORT {
                continue;
            }
            builder.set(name, value.clone());
        }
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_UPDATE), false);

        let request = builder.into_request(ItemKey::with_range(namespace, record_type), None);
        Ok(self.backend.update_item(&self.table, &request)?.new)
    }
}

impl SchemaSource for ApiMetadataStore {
    fn fetch_schema(&self, namespace: &str, kind: SchemaKind) -> DataApiResult<Option<Value>> {
        self.get_schema(namespace, kind)
    }
}
