//! Reserved attribute names, record-type names and defaults shared across the crate.

/// Top-level key for the Resource record in requests and responses
pub const RESOURCE: &str = "Resource";
/// Top-level key for the Metadata record in requests and responses
pub const METADATA: &str = "Metadata";
/// Top-level key for lineage references on update
pub const REFERENCES: &str = "References";
/// Key holding the structured address of an item in responses
pub const ITEM_ARN: &str = "ItemArn";
/// Response key for the requested item
pub const ITEM: &str = "Item";
/// Response key for the item master
pub const MASTER: &str = "Master";
/// Response key for update warnings
pub const WARNING: &str = "Warnings";

// Reserved item attributes
pub const DELETED: &str = "Deleted";
pub const TOMBSTONED: &str = "Tombstoned";
pub const ITEM_MASTER_ID: &str = "ItemMasterID";
pub const ITEM_VERSION: &str = "ItemVersion";
pub const LAST_UPDATE_DATE: &str = "LastUpdateDate";
pub const LAST_UPDATED_BY: &str = "LastUpdatedBy";
pub const LAST_UPDATE_ACTION: &str = "LastUpdateAction";

// Audit actions recorded in LastUpdateAction
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_RESTORE: &str = "restore";
pub const ACTION_REMOVE_ATTRIBUTE: &str = "remove-attribute";
pub const ACTION_ITEM_MASTER: &str = "item-master";

// Control table layout
pub const CONTROL_TABLE: &str = "DataApiControl";
pub const CONTROL_HASH: &str = "api";
pub const CONTROL_SORT: &str = "type";

/// Suffix appended to a Resource id to form its Metadata key
pub const META_ID_SUFFIX: &str = "-meta";
/// Suffix appended to the Resource table name to form the Metadata table name
pub const METADATA_TABLE_SUFFIX: &str = "-Metadata";

/// Structured address prefix: scheme, vendor and service
pub const ARN_BASE: &str = "arn:aws:dapi";

// Defaults
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1000;
pub const DEFAULT_SCHEMA_VALIDATION_REFRESH_HITCOUNT: u64 = 100;
pub const DEFAULT_BACKEND_PAGE_SIZE: usize = 1000;
pub const DEFAULT_REGION: &str = "local";
pub const DEFAULT_STAGE: &str = "dev";
pub const DEFAULT_ACCOUNT: &str = "000000000000";
pub const DEFAULT_CATALOG_DATABASE: &str = "DataApiCatalog";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Environment variables read by `DataApiSettings::from_env`
pub const ENV_LOG_LEVEL: &str = "DATA_API_LOG_LEVEL";
pub const ENV_REGION: &str = "DATA_API_REGION";
pub const ENV_STAGE: &str = "DATA_API_STAGE";
pub const ENV_ACCOUNT: &str = "DATA_API_ACCOUNT";
pub const ENV_STORAGE: &str = "DATA_API_STORAGE";
pub const ENV_CONTROL_TABLE: &str = "DATA_API_CONTROL_TABLE";

/// Returns the Metadata record key for a Resource id
pub fn meta_id(id: &str) -> String {
    format!("{}{}", id, META_ID_SUFFIX)
}

/// Returns the Metadata table name for a Resource table
pub fn metadata_table_name(table_name: &str) -> String {
    format!("{}{}", table_name, METADATA_TABLE_SUFFIX)
}

/// Returns the storage table name for a namespace in a stage
pub fn table_name(api_name: &str, stage: &str) -> String {
    format!("{}-{}", api_name, stage)
}

/// Returns the name of the secondary index on `attribute` for `table`
pub fn index_name(table: &str, attribute: &str) -> String {
    format!("{}-{}", table, attribute)
}

/// Reserved attributes that survive a tombstone delete
pub fn is_reserved(attribute: &str) -> bool {
    matches!(
        attribute,
        DELETED
            | TOMBSTONED
            | ITEM_MASTER_ID
            | ITEM_VERSION
            | LAST_UPDATE_DATE
            | LAST_UPDATED_BY
            | LAST_UPDATE_ACTION
    )
}
