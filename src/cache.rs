//! Process-wide cache of hydrated namespaces.
//!
//! A namespace is hydrated from its control-table configuration on first
//! use and kept until it is evicted. Metadata updates and drops through the
//! cache evict the instance; changes made by other processes are not seen.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::api::{Collaborators, DataApi};
use crate::config::{DataApiSettings, NamespaceConfig, NamespaceStatus};
use crate::control::ApiMetadataStore;
use crate::engine::StorageEngine;
use crate::error::{DataApiError, DataApiResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::params;
use crate::schema::SchemaValidationCache;
use crate::storage::{open_backend, BackupDescription, Item, StorageBackend};

/// Chooses the collaborators of a namespace when it is hydrated
pub type CollaboratorResolver = Arc<dyn Fn(&NamespaceConfig) -> Collaborators + Send + Sync>;

/// Cached instances, plus an eviction count per name. A load that started
/// before an eviction of its name must not publish what it loaded.
#[derive(Default)]
struct Instances {
    live: HashMap<String, Arc<DataApi>>,
    evictions: HashMap<String, u64>,
}

impl Instances {
    fn generation(&self, api_name: &str) -> u64 {
        self.evictions.get(api_name).copied().unwrap_or(0)
    }
}

pub struct InstanceCache {
    settings: DataApiSettings,
    backend: Arc<dyn StorageBackend>,
    control: Arc<ApiMetadataStore>,
    schemas: Arc<SchemaValidationCache>,
    metrics: Arc<MetricsRegistry>,
    collaborators: CollaboratorResolver,
    instances: RwLock<Instances>,
}

fn lock_poisoned<T>(_: T) -> DataApiError {
    DataApiError::detailed("Instance cache lock poisoned", None)
}

impl InstanceCache {
    pub fn new(
        settings: DataApiSettings,
        backend: Arc<dyn StorageBackend>,
        control: Arc<ApiMetadataStore>,
        schemas: Arc<SchemaValidationCache>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            settings,
            backend,
            control,
            schemas,
            metrics,
            collaborators: Arc::new(|_| Collaborators::default()),
            instances: RwLock::new(Instances::default()),
        }
    }

    /// Opens the configured backend, verifies the control table and wires the shared caches
    pub fn open(settings: DataApiSettings) -> DataApiResult<Self> {
        settings.apply_log_level();
        let metrics = Arc::new(MetricsRegistry::new());
        let backend = open_backend(&settings.backend, Arc::clone(&metrics))?;
        let control = Arc::new(ApiMetadataStore::new(Arc::clone(&backend), settings.control_table.clone()));
        control.verify_control_table()?;
        let schemas = Arc::new(SchemaValidationCache::new(control.clone(), Arc::clone(&metrics)));
        Ok(Self::new(settings, backend, control, schemas, metrics))
    }

    pub fn with_collaborators(mut self, resolver: CollaboratorResolver) -> Self {
        self.collaborators = resolver;
        self
    }

    pub fn settings(&self) -> &DataApiSettings {
        &self.settings
    }

    pub fn control(&self) -> &Arc<ApiMetadataStore> {
        &self.control
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn control_key(&self, api_name: &str) -> String {
        params::table_name(api_name, &self.settings.stage)
    }

    /// The hydrated namespace, loading it on first use.
    ///
    /// Unknown namespaces are ResourceNotFound; namespaces still being
    /// provisioned are InvalidArguments.
    pub fn get(&self, api_name: &str) -> DataApiResult<Arc<DataApi>> {
        loop {
            let generation = {
                let instances = self.instances.read().map_err(lock_poisoned)?;
                if let Some(instance) = instances.live.get(api_name) {
                    self.metrics.increment_instance_cache_hits();
                    return Ok(Arc::clone(instance));
                }
                instances.generation(api_name)
            };
            self.metrics.increment_instance_cache_misses();

            let namespace = self.control_key(api_name);
            let config = self
                .control
                .get_namespace_config(&namespace)?
                .ok_or_else(|| DataApiError::not_found(format!("API {} does not exist", api_name)))?;
            if config.status == NamespaceStatus::Creating {
                log_event_with_fields(
                    Event::InstanceRejected,
                    &[("api", api_name), ("reason", "API Not Active")],
                );
                return Err(DataApiError::invalid("API Not Active"));
            }

            let instance = Arc::new(self.hydrate(config)?);
            let mut instances = self.instances.write().map_err(lock_poisoned)?;
            if instances.generation(api_name) != generation {
                // Evicted while loading; the configuration read may be stale
                continue;
            }
            let instance = instances.live.entry(api_name.to_string()).or_insert(instance);
            log_event_with_fields(Event::InstanceHydrated, &[("api", api_name), ("namespace", namespace.as_str())]);
            return Ok(Arc::clone(&*instance));
        }
    }

    fn hydrate(&self, config: NamespaceConfig) -> DataApiResult<DataApi> {
        let collaborators = (self.collaborators)(&config);
        let engine = StorageEngine::open(
            Arc::clone(&self.backend),
            config,
            &self.settings,
            Arc::clone(&self.schemas),
            Arc::clone(&self.metrics),
        )?;
        Ok(DataApi::new(
            engine,
            Arc::clone(&self.control),
            Arc::clone(&self.schemas),
            &self.settings,
            collaborators,
        ))
    }

    /// Registers a namespace, provisions its tables and marks it Active
    pub fn provision(&self, mut config: NamespaceConfig, caller: &str) -> DataApiResult<Arc<DataApi>> {
        config.stage = self.settings.stage.clone();
        config.status = NamespaceStatus::Creating;
        let namespace = config.control_key();
        let api_name = config.api_name.clone();
        self.control.create_metadata(&config, caller)?;

        self.hydrate(config)?;
        self.control.set_status(&namespace, NamespaceStatus::Active, caller)?;
        self.remove(&api_name);
        self.get(&api_name)
    }

    pub fn contains(&self, api_name: &str) -> bool {
        self.instances
            .read()
            .map(|instances| instances.live.contains_key(api_name))
            .unwrap_or(false)
    }

    /// Evicts a namespace; returns whether it was cached
    pub fn remove(&self, api_name: &str) -> bool {
        let removed = self
            .instances
            .write()
            .map(|mut instances| {
                *instances.evictions.entry(api_name.to_string()).or_insert(0) += 1;
                instances.live.remove(api_name).is_some()
            })
            .unwrap_or(false);
        if removed {
            self.metrics.increment_instance_evictions();
            log_event_with_fields(Event::InstanceEvicted, &[("api", api_name)]);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.instances.read().map(|i| i.live.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges `updates` into the namespace's Meta record and evicts it so the
    /// next request hydrates the new configuration
    pub fn update_metadata(&self, api_name: &str, updates: &Item, caller: &str) -> DataApiResult<Option<Item>> {
        let updated = self
            .control
            .update_metadata(&self.control_key(api_name), updates, caller)?;
        if updated.is_some() {
            self.remove(api_name);
        }
        Ok(updated)
    }

    /// Status of a namespace, `None` when it does not exist
    pub fn status(&self, api_name: &str) -> DataApiResult<Option<NamespaceStatus>> {
        self.control.get_api_status(&self.control_key(api_name))
    }

    /// Namespaces deployed in this process's stage
    pub fn registry(&self) -> DataApiResult<Vec<String>> {
        self.control.get_registry(&self.settings.stage)
    }

    /// Drops a namespace's tables and control records and evicts it
    pub fn drop_namespace(&self, api_name: &str, backup: bool) -> DataApiResult<Vec<BackupDescription>> {
        let instance = self.get(api_name)?;
        let backups = instance.drop_namespace(backup)?;
        self.remove(api_name);
        Ok(backups)
    }

    /// Evicts every namespace
    pub fn close(&self) {
        let names: Vec<String> = self
            .instances
            .read()
            .map(|instances| instances.live.keys().cloned().collect())
            .unwrap_or_default();
        for name in names {
            self.remove(&name);
        }
    }
}
