//! Configuration.
//!
//! - `NamespaceConfig`: one namespace's settings, stored as the `Meta`
//!   record in the control table (PascalCase attributes)
//! - `DataApiSettings`: process-level settings, from defaults or environment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{DataApiError, DataApiResult};
use crate::observability::{Logger, Severity};
use crate::params;
use crate::storage::AttributeType;

/// How a whole-item delete is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Mark `Deleted=1`, keep attributes, restorable
    #[serde(rename = "SOFT", alias = "soft", alias = "Soft")]
    Soft,
    /// Mark deleted and tombstoned, strip non-reserved attributes
    #[serde(rename = "TOMBSTONE", alias = "tombstone", alias = "Tombstone")]
    Tombstone,
}

impl DeleteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteMode::Soft => "SOFT",
            DeleteMode::Tombstone => "TOMBSTONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SOFT" => Some(DeleteMode::Soft),
            "TOMBSTONE" => Some(DeleteMode::Tombstone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceStatus {
    Creating,
    Active,
}

/// A configured secondary index: `attr` or `attr=type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub attribute: String,
    pub attribute_type: AttributeType,
}

impl IndexDefinition {
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        let (attribute, attribute_type) = match entry.split_once('=') {
            Some((name, kind)) => (name.trim(), AttributeType::from_config(kind)),
            None => (entry, AttributeType::String),
        };
        Some(Self {
            attribute: attribute.to_string(),
            attribute_type,
        })
    }

    fn render(&self) -> String {
        let kind = match self.attribute_type {
            AttributeType::String => "string",
            AttributeType::Number => "number",
            AttributeType::Binary => "binary",
        };
        format!("{}={}", self.attribute, kind)
    }
}

/// Accepts either `["a", "b=number"]` or `"a,b=number"`
fn index_list<'de, D>(deserializer: D) -> Result<Vec<IndexDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let entries = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(list)) => list,
        Some(Raw::Csv(csv)) => csv.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    };
    Ok(entries.iter().filter_map(|e| IndexDefinition::parse(e)).collect())
}

fn serialize_index_list<S>(list: &[IndexDefinition], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(list.iter().map(IndexDefinition::render))
}

fn default_stage() -> String {
    params::DEFAULT_STAGE.to_string()
}

fn default_delete_mode() -> DeleteMode {
    DeleteMode::Soft
}

fn default_hitcount() -> u64 {
    params::DEFAULT_SCHEMA_VALIDATION_REFRESH_HITCOUNT
}

fn default_true() -> bool {
    true
}

fn default_status() -> NamespaceStatus {
    NamespaceStatus::Active
}

fn default_catalog_database() -> String {
    params::DEFAULT_CATALOG_DATABASE.to_string()
}

/// Settings of one namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceConfig {
    pub api_name: String,

    #[serde(default = "default_stage")]
    pub stage: String,

    pub primary_key: String,

    /// Overrides the derived `<api>-<stage>` table name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_table: Option<String>,

    #[serde(default = "default_delete_mode")]
    pub delete_mode: DeleteMode,

    #[serde(default)]
    pub allow_runtime_delete_mode_change: bool,

    #[serde(
        default,
        deserialize_with = "index_list",
        serialize_with = "serialize_index_list"
    )]
    pub table_indexes: Vec<IndexDefinition>,

    #[serde(
        default,
        deserialize_with = "index_list",
        serialize_with = "serialize_index_list"
    )]
    pub metadata_indexes: Vec<IndexDefinition>,

    #[serde(default = "default_hitcount")]
    pub schema_validation_refresh_hitcount: u64,

    #[serde(default = "default_true")]
    pub non_item_master_writes_allowed: bool,

    #[serde(default, rename = "StrictOCCV")]
    pub strict_occv: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_account: Option<String>,

    #[serde(default = "default_status")]
    pub status: NamespaceStatus,

    #[serde(default = "default_catalog_database")]
    pub catalog_database: String,

    #[serde(default, rename = "CrawlerRolename", skip_serializing_if = "Option::is_none")]
    pub crawler_role_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gremlin_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_config: Option<Value>,
}

impl NamespaceConfig {
    pub fn new(api_name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            stage: default_stage(),
            primary_key: primary_key.into(),
            storage_table: None,
            delete_mode: default_delete_mode(),
            allow_runtime_delete_mode_change: false,
            table_indexes: Vec::new(),
            metadata_indexes: Vec::new(),
            schema_validation_refresh_hitcount: default_hitcount(),
            non_item_master_writes_allowed: true,
            strict_occv: false,
            deployed_account: None,
            status: default_status(),
            catalog_database: default_catalog_database(),
            crawler_role_name: None,
            gremlin_address: None,
            search_config: None,
        }
    }

    /// Hash key of this namespace's control-table records
    pub fn control_key(&self) -> String {
        params::table_name(&self.api_name, &self.stage)
    }

    /// Resource table name
    pub fn table_name(&self) -> String {
        self.storage_table.clone().unwrap_or_else(|| self.control_key())
    }

    pub fn metadata_table_name(&self) -> String {
        params::metadata_table_name(&self.table_name())
    }

    /// Parses a control-table `Meta` record
    pub fn from_value(value: Value) -> DataApiResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| DataApiError::invalid(format!("Invalid namespace configuration: {}", e)))
    }

    /// Serializes to control-table attributes
    pub fn to_value(&self) -> DataApiResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| DataApiError::detailed(format!("Unable to encode namespace configuration: {}", e), None))
    }

    pub fn validate(&self) -> DataApiResult<()> {
        if self.api_name.trim().is_empty() {
            return Err(DataApiError::invalid("ApiName is required"));
        }
        if self.primary_key.trim().is_empty() {
            return Err(DataApiError::invalid("PrimaryKey is required"));
        }
        if params::is_reserved(&self.primary_key) {
            return Err(DataApiError::invalid(format!(
                "PrimaryKey {} is a reserved attribute",
                self.primary_key
            )));
        }
        Ok(())
    }
}

/// Storage backend variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory,
    File { path: PathBuf },
}

impl BackendConfig {
    /// Parses `memory` or `file:<path>`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("memory") {
            return Some(BackendConfig::Memory);
        }
        value
            .strip_prefix("file:")
            .filter(|path| !path.is_empty())
            .map(|path| BackendConfig::File {
                path: PathBuf::from(path),
            })
    }
}

fn default_region() -> String {
    params::DEFAULT_REGION.to_string()
}

fn default_account() -> String {
    params::DEFAULT_ACCOUNT.to_string()
}

fn default_control_table() -> String {
    params::CONTROL_TABLE.to_string()
}

fn default_max_response_size() -> usize {
    params::DEFAULT_MAX_RESPONSE_SIZE
}

fn default_backend() -> BackendConfig {
    BackendConfig::Memory
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_provision_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataApiSettings {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_stage")]
    pub stage: String,

    /// Account segment of item addresses
    #[serde(default = "default_account")]
    pub deployed_account: String,

    #[serde(default = "default_control_table")]
    pub control_table: String,

    /// Client-side cap on items per list/find response
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,

    #[serde(default = "default_backend")]
    pub backend: BackendConfig,

    #[serde(default = "default_poll_interval_ms")]
    pub provision_poll_interval_ms: u64,

    #[serde(default = "default_provision_timeout_ms")]
    pub provision_timeout_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DataApiSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            stage: default_stage(),
            deployed_account: default_account(),
            control_table: default_control_table(),
            max_response_size: default_max_response_size(),
            backend: default_backend(),
            provision_poll_interval_ms: default_poll_interval_ms(),
            provision_timeout_ms: default_provision_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl DataApiSettings {
    /// Defaults overridden by `DATA_API_*` environment variables
    pub fn from_env() -> DataApiResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> DataApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(region) = lookup(params::ENV_REGION) {
            settings.region = region;
        }
        if let Some(stage) = lookup(params::ENV_STAGE) {
            settings.stage = stage;
        }
        if let Some(account) = lookup(params::ENV_ACCOUNT) {
            settings.deployed_account = account;
        }
        if let Some(table) = lookup(params::ENV_CONTROL_TABLE) {
            settings.control_table = table;
        }
        if let Some(storage) = lookup(params::ENV_STORAGE) {
            settings.backend = BackendConfig::parse(&storage).ok_or_else(|| {
                DataApiError::invalid(format!(
                    "{} must be 'memory' or 'file:<path>', got {}",
                    params::ENV_STORAGE,
                    storage
                ))
            })?;
        }
        if let Some(level) = lookup(params::ENV_LOG_LEVEL) {
            if Severity::parse(&level).is_none() {
                return Err(DataApiError::invalid(format!(
                    "{} has unknown level {}",
                    params::ENV_LOG_LEVEL,
                    level
                )));
            }
            settings.log_level = level;
        }
        Ok(settings)
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn provision_poll_interval(&self) -> Duration {
        Duration::from_millis(self.provision_poll_interval_ms)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_millis(self.provision_timeout_ms)
    }

    /// Applies `log_level` to the process-wide logger
    pub fn apply_log_level(&self) {
        if let Some(severity) = Severity::parse(&self.log_level) {
            Logger::set_min_severity(severity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_namespace_defaults() {
        let config = NamespaceConfig::from_value(json!({
            "ApiName": "orders",
            "PrimaryKey": "id"
        }))
        .unwrap();
        assert_eq!(config.stage, "dev");
        assert_eq!(config.delete_mode, DeleteMode::Soft);
        assert_eq!(config.schema_validation_refresh_hitcount, 100);
        assert!(config.non_item_master_writes_allowed);
        assert!(!config.strict_occv);
        assert_eq!(config.status, NamespaceStatus::Active);
        assert_eq!(config.table_name(), "orders-dev");
        assert_eq!(config.metadata_table_name(), "orders-dev-Metadata");
    }

    #[test]
    fn test_indexes_from_csv_or_list() {
        let csv = NamespaceConfig::from_value(json!({
            "ApiName": "orders",
            "PrimaryKey": "id",
            "TableIndexes": "color, size=number",
            "MetadataIndexes": ["owner"]
        }))
        .unwrap();
        assert_eq!(csv.table_indexes.len(), 2);
        assert_eq!(csv.table_indexes[1].attribute, "size");
        assert_eq!(csv.table_indexes[1].attribute_type, AttributeType::Number);
        assert_eq!(csv.metadata_indexes[0].attribute, "owner");
    }

    #[test]
    fn test_control_record_extras_ignored() {
        let config = NamespaceConfig::from_value(json!({
            "api": "orders-dev",
            "type": "Meta",
            "ApiName": "orders",
            "PrimaryKey": "id",
            "DeleteMode": "tombstone",
            "StrictOCCV": true,
            "Status": "Creating",
            "LastUpdatedBy": "System"
        }))
        .unwrap();
        assert_eq!(config.delete_mode, DeleteMode::Tombstone);
        assert!(config.strict_occv);
        assert_eq!(config.status, NamespaceStatus::Creating);
    }

    #[test]
    fn test_round_trip_through_value() {
        let mut config = NamespaceConfig::new("orders", "id");
        config.table_indexes = vec![IndexDefinition::parse("size=int").unwrap()];
        let back = NamespaceConfig::from_value(config.to_value().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate() {
        assert!(NamespaceConfig::new("orders", "id").validate().is_ok());
        assert!(NamespaceConfig::new("", "id").validate().is_err());
        assert!(NamespaceConfig::new("orders", "ItemVersion").validate().is_err());
    }

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATA_API_REGION", "eu-west-1"),
            ("DATA_API_STORAGE", "file:/var/lib/dataapi"),
            ("DATA_API_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let settings =
            DataApiSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.stage, "dev");
        assert_eq!(
            settings.backend,
            BackendConfig::File {
                path: PathBuf::from("/var/lib/dataapi")
            }
        );
    }

    #[test]
    fn test_settings_reject_bad_values() {
        assert!(DataApiSettings::from_lookup(|k| {
            (k == "DATA_API_STORAGE").then(|| "s3://bucket".to_string())
        })
        .is_err());
        assert!(DataApiSettings::from_lookup(|k| {
            (k == "DATA_API_LOG_LEVEL").then(|| "loud".to_string())
        })
        .is_err());
    }
}
