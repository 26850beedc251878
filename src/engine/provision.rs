//! Table and index provisioning for a namespace.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::IndexDefinition;
use crate::error::{DataApiError, DataApiResult};
use crate::observability::{log_event_with_fields, Event};
use crate::params;
use crate::storage::{AttributeType, BackendError, IndexSpec, StorageBackend, TableDescription, TableSpec, TableStatus};

/// Polling bounds while waiting for a table to become active
#[derive(Debug, Clone, Copy)]
pub struct ProvisionWait {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Index definitions for a table: the `ItemMasterID` index first when
/// requested, then the configured indexes in declared order
pub fn index_specs(table: &str, configured: &[IndexDefinition], item_master_index_on: Option<&str>) -> Vec<IndexSpec> {
    let mut specs = Vec::with_capacity(configured.len() + 1);
    if let Some(resource_table) = item_master_index_on {
        specs.push(IndexSpec::new(
            params::index_name(resource_table, params::ITEM_MASTER_ID),
            params::ITEM_MASTER_ID,
            AttributeType::String,
        ));
    }
    specs.extend(configured.iter().map(|index| {
        IndexSpec::new(
            params::index_name(table, &index.attribute),
            index.attribute.clone(),
            index.attribute_type,
        )
    }));
    specs
}

/// Creates `table` keyed on `hash_key` if missing, adds any missing indexes,
/// and waits until it is active
pub fn ensure_table(
    backend: &dyn StorageBackend,
    table: &str,
    hash_key: &str,
    indexes: &[IndexSpec],
    wait: ProvisionWait,
) -> DataApiResult<TableDescription> {
    match backend.describe_table(table) {
        Ok(_) => {}
        Err(BackendError::TableNotFound(_)) => {
            match backend.create_table(&TableSpec::new(table, hash_key)) {
                Ok(_) | Err(BackendError::TableExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
            log_event_with_fields(Event::TableProvisioned, &[("table", table), ("key", hash_key)]);
        }
        Err(e) => return Err(e.into()),
    }

    let description = wait_until_active(backend, table, wait)?;
    if description.spec.hash_key != hash_key {
        return Err(DataApiError::invalid(format!(
            "Table {} is keyed on {}, not {}",
            table, description.spec.hash_key, hash_key
        )));
    }

    let mut added = false;
    for index in indexes {
        if description.spec.indexes.iter().any(|existing| existing.name == index.name) {
            continue;
        }
        backend.create_index(table, index)?;
        added = true;
        log_event_with_fields(
            Event::TableProvisioned,
            &[("table", table), ("index", index.name.as_str()), ("attribute", index.attribute.as_str())],
        );
    }

    if added {
        wait_until_active(backend, table, wait)
    } else {
        Ok(description)
    }
}

/// Polls until the table reports `Active`, bounded by the wait timeout
pub fn wait_until_active(
    backend: &dyn StorageBackend,
    table: &str,
    wait: ProvisionWait,
) -> DataApiResult<TableDescription> {
    let deadline = Instant::now() + wait.timeout;
    loop {
        let description = backend.describe_table(table)?;
        if description.status == TableStatus::Active {
            return Ok(description);
        }
        if Instant::now() >= deadline {
            return Err(DataApiError::detailed(
                format!("Timed out waiting for table {} to become active", table),
                None,
            ));
        }
        thread::sleep(wait.interval);
    }
}
