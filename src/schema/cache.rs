//! Process-wide cache of compiled validators, one per (namespace, record kind).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::validator::SchemaValidator;
use crate::config::NamespaceConfig;
use crate::error::{DataApiError, DataApiResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::params;

/// Which record of an item a schema applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Resource,
    Metadata,
}

impl SchemaKind {
    /// Parses `resource` or `metadata`, case-insensitive
    pub fn parse(value: &str) -> DataApiResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resource" => Ok(SchemaKind::Resource),
            "metadata" => Ok(SchemaKind::Metadata),
            _ => Err(DataApiError::invalid(format!(
                "Schema type must be {} or {}",
                params::RESOURCE,
                params::METADATA
            ))),
        }
    }

    /// Control-table record type holding this schema
    pub fn record_type(&self) -> &'static str {
        match self {
            SchemaKind::Resource => "ResourceSchema",
            SchemaKind::Metadata => "MetadataSchema",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Resource => params::RESOURCE,
            SchemaKind::Metadata => params::METADATA,
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where schema documents are stored
pub trait SchemaSource: Send + Sync {
    /// The stored schema for a namespace table, if one is set
    fn fetch_schema(&self, namespace: &str, kind: SchemaKind) -> DataApiResult<Option<Value>>;
}

/// One cached lookup.
///
/// An entry without a validator records that no schema is configured. It
/// counts its own uses against the refresh threshold, so a schema stored
/// by another process is picked up like a changed one.
struct Entry {
    validator: Option<Arc<SchemaValidator>>,
    unvalidated_uses: AtomicU64,
    refresh_after: u64,
}

impl Entry {
    fn new(validator: Option<Arc<SchemaValidator>>, refresh_after: u64) -> Self {
        Self {
            validator,
            unvalidated_uses: AtomicU64::new(0),
            refresh_after,
        }
    }

    fn needs_refresh(&self) -> bool {
        match &self.validator {
            Some(validator) => validator.needs_refresh(),
            None => self.unvalidated_uses.load(Ordering::Relaxed) >= self.refresh_after,
        }
    }

    /// The validator to apply, counting a use when there is none
    fn take(&self) -> Option<Arc<SchemaValidator>> {
        if self.validator.is_none() {
            self.unvalidated_uses.fetch_add(1, Ordering::Relaxed);
        }
        self.validator.clone()
    }
}

pub struct SchemaValidationCache {
    source: Arc<dyn SchemaSource>,
    entries: RwLock<HashMap<(String, SchemaKind), Arc<Entry>>>,
    metrics: Arc<MetricsRegistry>,
}

impl SchemaValidationCache {
    pub fn new(source: Arc<dyn SchemaSource>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Validates one record of an item.
    ///
    /// `strict` compiles the stored schema afresh for this call only.
    pub fn validate(
        &self,
        config: &NamespaceConfig,
        kind: SchemaKind,
        item: &Value,
        strict: bool,
    ) -> DataApiResult<()> {
        let namespace = config.control_key();
        let validator = if strict {
            self.compile(&namespace, kind, config.schema_validation_refresh_hitcount)?
        } else {
            self.cached(&namespace, kind, config.schema_validation_refresh_hitcount)?
        };

        let Some(validator) = validator else {
            return Ok(());
        };
        validator.validate(item).map_err(|e| {
            self.metrics.increment_validation_failures();
            let message = e.to_string();
            log_event_with_fields(
                Event::SchemaValidationFailed,
                &[
                    ("namespace", namespace.as_str()),
                    ("kind", kind.as_str()),
                    ("reason", message.as_str()),
                ],
            );
            DataApiError::from(e)
        })
    }

    /// Whether the cached entry has reached its refresh threshold
    pub fn needs_refresh(&self, namespace: &str, kind: SchemaKind) -> bool {
        let Ok(entries) = self.entries.read() else {
            return true;
        };
        entries
            .get(&(namespace.to_string(), kind))
            .map_or(true, |entry| entry.needs_refresh())
    }

    /// Drops cached validators for a namespace; `None` drops both kinds
    pub fn invalidate(&self, namespace: &str, kind: Option<SchemaKind>) {
        if let Ok(mut entries) = self.entries.write() {
            match kind {
                Some(kind) => {
                    entries.remove(&(namespace.to_string(), kind));
                }
                None => entries.retain(|(ns, _), _| ns != namespace),
            }
        }
        log_event_with_fields(
            Event::SchemaCacheInvalidated,
            &[
                ("namespace", namespace),
                ("kind", kind.map(|k| k.as_str()).unwrap_or("all")),
            ],
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(
        &self,
        namespace: &str,
        kind: SchemaKind,
        refresh_after: u64,
    ) -> DataApiResult<Option<Arc<SchemaValidator>>> {
        let key = (namespace.to_string(), kind);
        {
            let entries = self.entries.read().map_err(lock_error)?;
            if let Some(entry) = entries.get(&key) {
                if !entry.needs_refresh() {
                    self.metrics.increment_schema_cache_hits();
                    return Ok(entry.take());
                }
            }
        }

        let validator = self.compile(namespace, kind, refresh_after)?;
        let present = validator.is_some();
        let entry = Arc::new(Entry::new(validator, refresh_after));
        self.entries
            .write()
            .map_err(lock_error)?
            .insert(key, Arc::clone(&entry));
        self.metrics.increment_schema_cache_loads();
        log_event_with_fields(
            Event::SchemaCacheLoaded,
            &[
                ("namespace", namespace),
                ("kind", kind.as_str()),
                ("present", if present { "true" } else { "false" }),
            ],
        );
        Ok(entry.take())
    }

    fn compile(
        &self,
        namespace: &str,
        kind: SchemaKind,
        refresh_after: u64,
    ) -> DataApiResult<Option<Arc<SchemaValidator>>> {
        match self.source.fetch_schema(namespace, kind)? {
            Some(document) => Ok(Some(Arc::new(SchemaValidator::compile(&document, refresh_after)?))),
            None => Ok(None),
        }
    }
}

fn lock_error<T>(_: std::sync::PoisonError<T>) -> DataApiError {
    DataApiError::detailed("Schema cache lock poisoned", None)
}
