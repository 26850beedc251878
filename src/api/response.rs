//! Response shapes of the data API operations.

use serde::Serialize;

use crate::storage::Item;

/// An item as returned to callers, addressed by its structured address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    #[serde(rename = "ItemArn")]
    pub item_arn: String,
    #[serde(rename = "Resource", skip_serializing_if = "Option::is_none")]
    pub resource: Option<Item>,
    #[serde(rename = "Metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Item>,
}

/// `{Item, Master?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetResponse {
    #[serde(rename = "Item")]
    pub item: ItemView,
    #[serde(rename = "Master", skip_serializing_if = "Option::is_none")]
    pub master: Option<ItemView>,
}

/// One page of found items
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindResponse {
    #[serde(rename = "Items")]
    pub items: Vec<ItemView>,
    #[serde(rename = "LastEvaluatedKey", skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<String>,
}
