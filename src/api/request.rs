//! Request bodies of the data API operations.
//!
//! Bodies arrive as JSON with PascalCase keys and are parsed into the
//! engine's typed requests here. Malformed bodies are InvalidArguments.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::config::DeleteMode;
use crate::engine::{DeleteRequest, FindRequest, ItemUpdate, ListRequest};
use crate::error::{DataApiError, DataApiResult};
use crate::params;
use crate::storage::Item;

/// How `get` treats an item linked to a master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasterOption {
    /// Only the requested item
    #[default]
    ItemOnly,
    /// The item and its full master
    Include,
    /// The item and the master's identity
    Prefer,
}

impl MasterOption {
    pub fn parse(value: Option<&str>) -> DataApiResult<Self> {
        let Some(value) = value else {
            return Ok(MasterOption::ItemOnly);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(MasterOption::ItemOnly),
            "include" => Ok(MasterOption::Include),
            "prefer" => Ok(MasterOption::Prefer),
            other => Err(DataApiError::invalid(format!(
                "Unknown item master option {}. Use include or prefer",
                other
            ))),
        }
    }
}

fn parse_body<T: DeserializeOwned>(operation: &str, body: Value) -> DataApiResult<T> {
    serde_json::from_value(body)
        .map_err(|e| DataApiError::invalid(format!("Malformed {} request: {}", operation, e)))
}

/// Body of an update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateBody {
    #[serde(default)]
    pub resource: Option<Item>,

    #[serde(default)]
    pub metadata: Option<Item>,

    #[serde(default)]
    pub constraints: Option<Item>,

    #[serde(default)]
    pub item_version: Option<i64>,

    /// Lineage links from this item, each naming a target `Resource`
    #[serde(default)]
    pub references: Option<Vec<Value>>,

    #[serde(default)]
    pub strict_schema_validation: bool,
}

impl UpdateBody {
    pub fn parse(body: Value) -> DataApiResult<Self> {
        parse_body("Update", body)
    }

    pub fn resource(resource: Item) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }

    /// Splits into the engine update and any lineage references
    pub fn into_parts(self) -> (ItemUpdate, Option<Vec<Value>>) {
        let update = ItemUpdate {
            resource: self.resource,
            metadata: self.metadata,
            constraints: self.constraints,
            item_version: self.item_version,
            strict_schema_validation: self.strict_schema_validation,
        };
        (update, self.references)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDeleteBody {
    #[serde(default)]
    resource: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<Vec<String>>,
    #[serde(default)]
    delete_mode: Option<String>,
}

/// Parses `{Resource: [...]}`, `{Metadata: [...]}` or `{}` with an optional `DeleteMode`
pub fn parse_delete(body: Value) -> DataApiResult<DeleteRequest> {
    let raw: RawDeleteBody = if body.is_null() {
        RawDeleteBody::default()
    } else {
        parse_body("Delete", body)?
    };
    let mode = raw
        .delete_mode
        .map(|mode| {
            DeleteMode::parse(&mode).ok_or_else(|| {
                DataApiError::invalid(format!(
                    "Delete mode {} invalid. Use {} or {}",
                    mode,
                    DeleteMode::Soft.as_str(),
                    DeleteMode::Tombstone.as_str()
                ))
            })
        })
        .transpose()?;
    Ok(DeleteRequest {
        resource: raw.resource,
        metadata: raw.metadata,
        mode,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFindBody {
    #[serde(default)]
    resource: Option<Item>,
    #[serde(default)]
    metadata: Option<Item>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    exclusive_start_key: Option<String>,
}

/// Parses `{Resource|Metadata: {attr: value}, Limit?, ExclusiveStartKey?}`
pub fn parse_find(body: Value) -> DataApiResult<FindRequest> {
    let raw: RawFindBody = parse_body("Find", body)?;
    Ok(FindRequest {
        resource: raw.resource,
        metadata: raw.metadata,
        limit: raw.limit,
        exclusive_start_key: raw.exclusive_start_key,
    })
}

fn integer_param<T: std::str::FromStr>(params: &BTreeMap<String, String>, name: &str) -> DataApiResult<Option<T>> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| DataApiError::invalid(format!("{} must be an integer, got {}", name, raw)))
        })
        .transpose()
}

/// Parses list query parameters: `Limit`, `Segment`, `TotalSegments`, `ExclusiveStartKey`
pub fn parse_list(query: &BTreeMap<String, String>) -> DataApiResult<ListRequest> {
    Ok(ListRequest {
        limit: integer_param(query, "Limit")?,
        segment: integer_param(query, "Segment")?,
        total_segments: integer_param(query, "TotalSegments")?,
        exclusive_start_key: query.get("ExclusiveStartKey").cloned(),
    })
}

/// Splits one lineage reference into its target and extra properties
pub fn parse_reference(reference: &Value) -> DataApiResult<(String, Item)> {
    let malformed = || {
        DataApiError::invalid(format!(
            "Malformed Reference: {}. Must Contain a {}",
            reference,
            params::RESOURCE
        ))
    };
    let mut properties = reference.as_object().cloned().ok_or_else(malformed)?;
    let target = match properties.remove(params::RESOURCE) {
        Some(Value::String(target)) if !target.is_empty() => target,
        _ => return Err(malformed()),
    };
    Ok((target, properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_master_option() {
        assert_eq!(MasterOption::parse(None).unwrap(), MasterOption::ItemOnly);
        assert_eq!(MasterOption::parse(Some("Include")).unwrap(), MasterOption::Include);
        assert_eq!(MasterOption::parse(Some("PREFER")).unwrap(), MasterOption::Prefer);
        assert!(MasterOption::parse(Some("sometimes")).is_err());
    }

    #[test]
    fn test_update_body() {
        let body = UpdateBody::parse(json!({
            "Resource": {"color": "red"},
            "ItemVersion": 3,
            "References": [{"Resource": "arn:aws:dapi:r:a:t:B"}],
            "StrictSchemaValidation": true
        }))
        .unwrap();
        let (update, references) = body.into_parts();
        assert_eq!(update.item_version, Some(3));
        assert!(update.strict_schema_validation);
        assert!(update.metadata.is_none());
        assert_eq!(references.unwrap().len(), 1);

        let err = UpdateBody::parse(json!({"Resource": "red"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_delete_body() {
        let whole = parse_delete(json!({})).unwrap();
        assert_eq!(whole, DeleteRequest::whole_item());
        assert_eq!(parse_delete(Value::Null).unwrap(), DeleteRequest::whole_item());

        let attrs = parse_delete(json!({"Resource": ["color"], "DeleteMode": "tombstone"})).unwrap();
        assert_eq!(attrs.resource, Some(vec!["color".to_string()]));
        assert_eq!(attrs.mode, Some(DeleteMode::Tombstone));

        assert!(parse_delete(json!({"DeleteMode": "shred"})).is_err());
    }

    #[test]
    fn test_list_params() {
        let mut query = BTreeMap::new();
        query.insert("Limit".to_string(), "10".to_string());
        query.insert("Segment".to_string(), "1".to_string());
        query.insert("TotalSegments".to_string(), "4".to_string());
        let request = parse_list(&query).unwrap();
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.segment, Some(1));
        assert_eq!(request.total_segments, Some(4));

        query.insert("Segment".to_string(), "one".to_string());
        assert_eq!(parse_list(&query).unwrap_err().kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_find_body() {
        let request = parse_find(json!({"Metadata": {"owner": "ops"}, "Limit": 5})).unwrap();
        assert!(request.resource.is_none());
        assert_eq!(request.limit, Some(5));
    }

    #[test]
    fn test_reference() {
        let (target, properties) = parse_reference(&json!({"Resource": "B", "kind": "derived"})).unwrap();
        assert_eq!(target, "B");
        assert_eq!(properties["kind"], json!("derived"));
        assert!(parse_reference(&json!({"kind": "derived"})).is_err());
        assert!(parse_reference(&json!("B")).is_err());
    }
}
