//! Observable events
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events in the data API core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ConfigLoaded,
    ControlTableVerified,
    TableProvisioned,
    NamespaceDropped,

    // Instance cache
    InstanceHydrated,
    InstanceEvicted,
    InstanceRejected,

    // Schema validation
    SchemaCacheLoaded,
    SchemaCacheInvalidated,
    SchemaValidationFailed,
    SchemaStored,
    SchemaRemoved,

    // Item writes
    ItemUpdated,
    ItemDeleted,
    ItemRestored,
    AttributesRemoved,
    ItemMasterSet,
    ItemMasterRemoved,
    ConditionalCheckFailed,

    // Reads
    ItemRead,
    ItemsListed,
    ItemsFound,

    // Collaborators
    ReferencesAdded,

    // Backend
    BackendRecovered,
    BackendCorruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ControlTableVerified => "CONTROL_TABLE_VERIFIED",
            Event::TableProvisioned => "TABLE_PROVISIONED",
            Event::NamespaceDropped => "NAMESPACE_DROPPED",

            Event::InstanceHydrated => "INSTANCE_HYDRATED",
            Event::InstanceEvicted => "INSTANCE_EVICTED",
            Event::InstanceRejected => "INSTANCE_REJECTED",

            Event::SchemaCacheLoaded => "SCHEMA_CACHE_LOADED",
            Event::SchemaCacheInvalidated => "SCHEMA_CACHE_INVALIDATED",
            Event::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            Event::SchemaStored => "SCHEMA_STORED",
            Event::SchemaRemoved => "SCHEMA_REMOVED",

            Event::ItemUpdated => "ITEM_UPDATED",
            Event::ItemDeleted => "ITEM_DELETED",
            Event::ItemRestored => "ITEM_RESTORED",
            Event::AttributesRemoved => "ATTRIBUTES_REMOVED",
            Event::ItemMasterSet => "ITEM_MASTER_SET",
            Event::ItemMasterRemoved => "ITEM_MASTER_REMOVED",
            Event::ConditionalCheckFailed => "CONDITIONAL_CHECK_FAILED",

            Event::ItemRead => "ITEM_READ",
            Event::ItemsListed => "ITEMS_LISTED",
            Event::ItemsFound => "ITEMS_FOUND",

            Event::ReferencesAdded => "REFERENCES_ADDED",

            Event::BackendRecovered => "BACKEND_RECOVERED",
            Event::BackendCorruption => "BACKEND_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SchemaValidationFailed
                | Event::ConditionalCheckFailed
                | Event::InstanceRejected
                | Event::BackendCorruption
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
