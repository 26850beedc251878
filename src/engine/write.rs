//! Mutations: update, delete, restore, attribute removal, item-master linkage.
//!
//! Only item updates increment `ItemVersion`. Deletes, restores, attribute
//! removals and master links stamp the audit fields without a version bump,
//! so a soft delete followed by a restore leaves the item's attributes as
//! they were.

use serde_json::{Map, Value};

use super::types::{DeleteRequest, ItemMasterOutcome, ItemUpdate, UpdateResponse};
use super::{is_deleted, master_of, StorageEngine, TableKind};
use crate::config::DeleteMode;
use crate::error::{DataApiError, DataApiResult};
use crate::expression::{decorate, AuditStamp, Condition, UpdateExpressionBuilder};
use crate::observability::{log_event_with_fields, Event};
use crate::params;
use crate::schema::SchemaKind;
use crate::storage::{BackendError, Item, ItemKey, QueryRequest, UpdateOutput, UpdateRequest};

/// Attributes a caller payload may not write directly
fn sanitize(payload: &Item, primary_key: &str) -> Item {
    payload
        .iter()
        .filter(|(name, _)| {
            !matches!(
                name.as_str(),
                params::LAST_UPDATE_DATE
                    | params::LAST_UPDATED_BY
                    | params::LAST_UPDATE_ACTION
                    | params::ITEM_VERSION
                    | params::DELETED
                    | params::TOMBSTONED
            ) && name.as_str() != primary_key
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

impl StorageEngine {
    /// Runs a conditional update. `Ok(None)` means the condition did not hold.
    fn try_update(&self, kind: TableKind, request: &UpdateRequest) -> DataApiResult<Option<UpdateOutput>> {
        match self.backend.update_item(self.table(kind), request) {
            Ok(output) => Ok(Some(output)),
            Err(BackendError::ConditionalCheckFailed(condition)) => {
                self.metrics.increment_conditional_check_failures();
                let key = request.key.to_string();
                log_event_with_fields(
                    Event::ConditionalCheckFailed,
                    &[
                        ("table", self.table(kind)),
                        ("key", key.as_str()),
                        ("condition", condition.as_str()),
                    ],
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Effective delete mode: the requested one only when runtime changes are allowed
    fn delete_mode(&self, requested: Option<DeleteMode>) -> DeleteMode {
        match requested {
            Some(mode) if mode != self.config.delete_mode => {
                if self.config.allow_runtime_delete_mode_change {
                    mode
                } else {
                    log_event_with_fields(
                        Event::ItemDeleted,
                        &[
                            ("requested_mode", mode.as_str()),
                            ("applied_mode", self.config.delete_mode.as_str()),
                            ("override", "refused"),
                        ],
                    );
                    self.config.delete_mode
                }
            }
            _ => self.config.delete_mode,
        }
    }

    /// Writes Resource and/or Metadata fields.
    ///
    /// The Resource write is conditioned on, combined with AND:
    /// - `ItemMasterID` absent or equal to `id`, unless non-master writes are allowed
    /// - each constraint attribute equal to the supplied value
    /// - `ItemVersion` absent or equal to the supplied version, under strict OCCV
    pub fn update(&self, id: &str, update: ItemUpdate, caller: &str) -> DataApiResult<UpdateResponse> {
        let pk = self.config.primary_key.clone();

        if let Some(resource) = &update.resource {
            if resource.contains_key(params::ITEM_MASTER_ID) {
                return Err(DataApiError::invalid(format!("Cannot Update {}", params::ITEM_MASTER_ID)));
            }
            let mut candidate = resource.clone();
            candidate.entry(pk.clone()).or_insert_with(|| Value::from(id));
            self.schemas.validate(
                &self.config,
                SchemaKind::Resource,
                &Value::Object(candidate),
                update.strict_schema_validation,
            )?;
        }
        if let Some(metadata) = &update.metadata {
            self.schemas.validate(
                &self.config,
                SchemaKind::Metadata,
                &Value::Object(metadata.clone()),
                update.strict_schema_validation,
            )?;
        }

        let mut response = UpdateResponse::default();

        if let Some(resource) = &update.resource {
            let mut conditions = Vec::new();
            if !self.config.non_item_master_writes_allowed {
                conditions.push(
                    Condition::not_exists(params::ITEM_MASTER_ID)
                        .or(Condition::equals(params::ITEM_MASTER_ID, id)),
                );
            }
            if let Some(constraints) = &update.constraints {
                conditions.extend(Condition::matching(constraints));
            }
            if self.config.strict_occv {
                let absent = Condition::not_exists(params::ITEM_VERSION);
                conditions.push(match update.item_version {
                    Some(version) => absent.or(Condition::equals(params::ITEM_VERSION, version)),
                    None => absent,
                });
            }
            let condition = Condition::all(conditions);

            let request = self.item_update_request(id, resource, condition.clone(), caller);
            let output = self.try_update(TableKind::Resource, &request)?.ok_or_else(|| {
                DataApiError::constraint(format!(
                    "Conditional Check Violated: {}",
                    condition.map(|c| c.to_string()).unwrap_or_default()
                ))
            })?;

            self.metrics.increment_items_updated();
            let version = output
                .new
                .get(params::ITEM_VERSION)
                .map(Value::to_string)
                .unwrap_or_default();
            log_event_with_fields(
                Event::ItemUpdated,
                &[
                    ("table", self.resource_table.as_str()),
                    ("id", id),
                    ("version", version.as_str()),
                    ("caller", caller),
                ],
            );

            if let Some(master) = master_of(&output.new).filter(|m| *m != id) {
                let mut warning = Map::new();
                warning.insert("Message".to_string(), Value::from("Updated Non Item Master"));
                warning.insert(pk.clone(), Value::from(id));
                warning.insert(params::ITEM_MASTER_ID.to_string(), Value::from(master));
                response.warnings.push(Value::Object(warning));
            }
        }

        if let Some(metadata) = &update.metadata {
            let meta_id = params::meta_id(id);
            let request = self.item_update_request(&meta_id, metadata, None, caller);
            self.try_update(TableKind::Metadata, &request)?;
            self.metrics.increment_items_updated();
            log_event_with_fields(
                Event::ItemUpdated,
                &[("table", self.metadata_table.as_str()), ("id", meta_id.as_str()), ("caller", caller)],
            );
        }

        Ok(response)
    }

    /// `REMOVE Deleted`, `SET` each writable field, audit and `ADD ItemVersion 1`
    fn item_update_request(&self, key: &str, payload: &Item, condition: Option<Condition>, caller: &str) -> UpdateRequest {
        let mut builder = UpdateExpressionBuilder::new();
        builder.remove(params::DELETED);
        for (name, value) in &sanitize(payload, &self.config.primary_key) {
            builder.set(name, value.clone());
        }
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_UPDATE), true);
        builder.into_request(ItemKey::new(key), condition)
    }

    /// Deletes attributes, the Metadata record, or the whole item.
    /// Returns false when nothing was modified.
    pub fn delete(&self, id: &str, request: DeleteRequest, caller: &str) -> DataApiResult<bool> {
        if let Some(attributes) = request.resource.as_ref().filter(|a| !a.is_empty()) {
            return self.remove_attributes(TableKind::Resource, id, attributes, caller);
        }
        if request.resource.is_none() {
            if let Some(attributes) = &request.metadata {
                if attributes.is_empty() {
                    return self.delete_metadata(id);
                }
                return self.remove_attributes(TableKind::Metadata, id, attributes, caller);
            }
        }
        self.delete_item(id, request.mode, caller)
    }

    /// Removes the Metadata record; returns whether one existed
    pub fn delete_metadata(&self, id: &str) -> DataApiResult<bool> {
        let meta_id = params::meta_id(id);
        let removed = self
            .backend
            .delete_item(&self.metadata_table, &ItemKey::new(meta_id.as_str()), None)?
            .is_some();
        if removed {
            self.metrics.increment_items_deleted();
            log_event_with_fields(
                Event::ItemDeleted,
                &[("table", self.metadata_table.as_str()), ("id", meta_id.as_str())],
            );
        }
        Ok(removed)
    }

    /// Removes named attributes from one record of a live item
    pub fn remove_attributes(
        &self,
        kind: TableKind,
        id: &str,
        attributes: &[String],
        caller: &str,
    ) -> DataApiResult<bool> {
        let pk = &self.config.primary_key;
        if let Some(reserved) = attributes.iter().find(|a| *a == pk || params::is_reserved(a)) {
            return Err(DataApiError::invalid(format!("Cannot remove {}", reserved)));
        }

        let key = match kind {
            TableKind::Resource => id.to_string(),
            TableKind::Metadata => params::meta_id(id),
        };
        let mut builder = UpdateExpressionBuilder::new();
        for attribute in attributes {
            builder.remove(attribute);
        }
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_REMOVE_ATTRIBUTE), false);
        let condition = Condition::exists(pk.as_str()).and(Condition::not_deleted());
        let request = builder.into_request(ItemKey::new(key.as_str()), Some(condition));

        let modified = self.try_update(kind, &request)?.is_some();
        if modified {
            let removed = attributes.join(",");
            log_event_with_fields(
                Event::AttributesRemoved,
                &[("table", self.table(kind)), ("id", key.as_str()), ("attributes", removed.as_str())],
            );
        }
        Ok(modified)
    }

    /// Marks the whole item deleted. A tombstone delete also strips every
    /// non-reserved attribute and removes the Metadata record.
    fn delete_item(&self, id: &str, requested: Option<DeleteMode>, caller: &str) -> DataApiResult<bool> {
        let mode = self.delete_mode(requested);
        let current = self
            .fetch(TableKind::Resource, id, true)?
            .ok_or_else(|| DataApiError::not_found(format!("Invalid ID {}", id)))?;
        if is_deleted(&current) {
            return Ok(false);
        }

        let pk = &self.config.primary_key;
        let mut builder = UpdateExpressionBuilder::new();
        builder.set(params::DELETED, Value::from(1));
        if mode == DeleteMode::Tombstone {
            builder.set(params::TOMBSTONED, Value::Bool(true));
            for attribute in current.keys().filter(|a| *a != pk && !params::is_reserved(a)) {
                builder.remove(attribute);
            }
        }
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_DELETE), false);
        let condition = Condition::exists(pk.as_str()).and(Condition::not_deleted());
        let request = builder.into_request(ItemKey::new(id), Some(condition));

        if self.try_update(TableKind::Resource, &request)?.is_none() {
            return Ok(false);
        }
        if mode == DeleteMode::Tombstone {
            self.delete_metadata(id)?;
        }

        self.metrics.increment_items_deleted();
        log_event_with_fields(
            Event::ItemDeleted,
            &[
                ("table", self.resource_table.as_str()),
                ("id", id),
                ("mode", mode.as_str()),
                ("caller", caller),
            ],
        );
        Ok(true)
    }

    /// Clears the deleted flag of a soft-deleted item
    pub fn restore(&self, id: &str, caller: &str) -> DataApiResult<()> {
        if self.fetch(TableKind::Resource, id, true)?.is_none() {
            return Err(DataApiError::not_found("Invalid Object Reference"));
        }

        let mut builder = UpdateExpressionBuilder::new();
        builder.remove(params::DELETED).remove(params::TOMBSTONED);
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_RESTORE), false);
        let condition = Condition::equals(params::DELETED, 1).and(
            Condition::equals(params::TOMBSTONED, false).or(Condition::not_exists(params::TOMBSTONED)),
        );
        let request = builder.into_request(ItemKey::new(id), Some(condition));

        if self.try_update(TableKind::Resource, &request)?.is_none() {
            return Err(DataApiError::invalid(
                "Unable to Restore Tombstoned Resources or Resource is not Deleted",
            ));
        }

        self.metrics.increment_items_restored();
        log_event_with_fields(
            Event::ItemRestored,
            &[("table", self.resource_table.as_str()), ("id", id), ("caller", caller)],
        );
        Ok(())
    }

    /// Whether any other item, deleted or not, names `id` as its master
    fn has_dependents(&self, id: &str) -> DataApiResult<bool> {
        let mut request = QueryRequest {
            index: params::index_name(&self.resource_table, params::ITEM_MASTER_ID),
            value: Value::from(id),
            filter: Some(Condition::not_equals(self.config.primary_key.as_str(), id)),
            limit: None,
            exclusive_start_key: None,
        };
        loop {
            let page = self.backend.query(&self.resource_table, &request)?;
            self.metrics.increment_queries_executed();
            if !page.items.is_empty() {
                return Ok(true);
            }
            match page.last_evaluated_key {
                Some(key) => request.exclusive_start_key = Some(key),
                None => return Ok(false),
            }
        }
    }

    /// Links each id to `master_id`. Each id succeeds or fails on its own;
    /// missing or deleted ids, the master itself, and ids that are masters
    /// of other items report `updated: false`.
    pub fn item_master_update(
        &self,
        ids: &[String],
        master_id: &str,
        caller: &str,
    ) -> DataApiResult<Vec<ItemMasterOutcome>> {
        let master = self
            .fetch(TableKind::Resource, master_id, false)?
            .ok_or_else(|| DataApiError::invalid(format!("Invalid Item Master Reference {}", master_id)))?;
        if let Some(other) = master_of(&master).filter(|m| *m != master_id) {
            return Err(DataApiError::invalid(format!(
                "Item Master {} is itself linked to {}",
                master_id, other
            )));
        }

        let pk = &self.config.primary_key;
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            let updated = if id == master_id || self.has_dependents(id)? {
                false
            } else {
                let mut builder = UpdateExpressionBuilder::new();
                builder.set(params::ITEM_MASTER_ID, Value::from(master_id));
                decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_ITEM_MASTER), false);
                let condition = Condition::exists(pk.as_str()).and(Condition::not_deleted());
                let request = builder.into_request(ItemKey::new(id), Some(condition));
                self.try_update(TableKind::Resource, &request)?.is_some()
            };
            if updated {
                log_event_with_fields(
                    Event::ItemMasterSet,
                    &[("id", id), ("master", master_id), ("caller", caller)],
                );
            }
            outcomes.push(ItemMasterOutcome {
                id: id.to_string(),
                updated,
            });
        }
        Ok(outcomes)
    }

    /// Unlinks `id` from its master, only if the stored master is `asserted_master`.
    /// Returns false when the item has no master.
    pub fn item_master_delete(&self, id: &str, asserted_master: &str, caller: &str) -> DataApiResult<bool> {
        let current = self
            .fetch(TableKind::Resource, id, false)?
            .ok_or_else(|| DataApiError::not_found(format!("Invalid ID {}", id)))?;
        match master_of(&current) {
            None => return Ok(false),
            Some(stored) if stored != asserted_master => {
                return Err(DataApiError::invalid(format!(
                    "Item Master {} does not match stored value {}",
                    asserted_master, stored
                )))
            }
            Some(_) => {}
        }

        let mut builder = UpdateExpressionBuilder::new();
        builder.remove(params::ITEM_MASTER_ID);
        decorate(&mut builder, &AuditStamp::now(caller, params::ACTION_ITEM_MASTER), false);
        let condition = Condition::equals(params::ITEM_MASTER_ID, asserted_master);
        let request = builder.into_request(ItemKey::new(id), Some(condition));

        if self.try_update(TableKind::Resource, &request)?.is_none() {
            return Err(DataApiError::invalid(format!(
                "Item Master of {} changed during the request",
                id
            )));
        }
        log_event_with_fields(
            Event::ItemMasterRemoved,
            &[("id", id), ("master", asserted_master), ("caller", caller)],
        );
        Ok(true)
    }
}
