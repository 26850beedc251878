//! Paged reads: segmented listing and criteria search.
//!
//! Deleted items never appear in results. A page's resume token is the
//! primary key to continue after; its absence means the listing is complete.

use serde_json::Value;

use super::types::{FindRequest, ItemPage, ListRequest};
use super::{StorageEngine, TableKind};
use crate::error::{DataApiError, DataApiResult};
use crate::expression::Condition;
use crate::observability::{trace_event, Event};
use crate::params;
use crate::storage::{AttributeType, Item, ItemKey, Page, QueryRequest, ScanRequest};

/// Where a find is answered from
#[derive(Debug, Clone, PartialEq)]
enum Route {
    Index { name: String, attribute: String, value: Value },
    Scan,
}

impl StorageEngine {
    /// One page of live Resource items, optionally one segment of a parallel scan
    pub fn list(&self, request: &ListRequest) -> DataApiResult<ItemPage> {
        let segment = match (request.segment, request.total_segments) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(DataApiError::invalid(
                    "Use of Parallel Scan requires Segment and TotalSegments",
                ))
            }
            (Some(segment), Some(total)) if total == 0 || segment >= total => {
                return Err(DataApiError::invalid(format!(
                    "Segment {} is out of range for {} TotalSegments",
                    segment, total
                )))
            }
            (Some(segment), Some(total)) => Some((segment, total)),
        };

        let limit = request
            .limit
            .unwrap_or(self.max_response_size)
            .clamp(1, self.max_response_size);
        let scan = ScanRequest {
            filter: Some(Condition::not_deleted()),
            limit: Some(limit),
            segment,
            exclusive_start_key: request.exclusive_start_key.as_deref().map(ItemKey::new),
        };
        let page = self.backend.scan(&self.resource_table, &scan)?;
        self.metrics.increment_queries_executed();
        trace_event(
            Event::ItemsListed,
            &[
                ("table", self.resource_table.as_str()),
                ("scanned", page.scanned_count.to_string().as_str()),
                ("returned", page.items.len().to_string().as_str()),
            ],
        );

        Ok(ItemPage {
            items: page.items,
            last_evaluated_key: page.last_evaluated_key.map(|k| k.hash),
        })
    }

    /// Equality search over exactly one of Resource or Metadata.
    ///
    /// The first criterion on an indexed attribute (declared index order,
    /// then `ItemMasterID`) is answered from its index and the remaining
    /// criteria filter the candidates. Without one the table is scanned
    /// with every criterion as a filter. Both paths return the same items.
    pub fn find(&self, request: &FindRequest) -> DataApiResult<ItemPage> {
        let (kind, criteria) = match (&request.resource, &request.metadata) {
            (Some(_), Some(_)) => {
                return Err(DataApiError::invalid(
                    "Find only supports Resource or Metadata search, not both",
                ))
            }
            (Some(criteria), None) => (TableKind::Resource, criteria),
            (None, Some(criteria)) => (TableKind::Metadata, criteria),
            (None, None) => return Err(DataApiError::invalid("Malformed Find Request")),
        };

        let route = self.route(kind, criteria);
        let remaining: Item = match &route {
            Route::Index { attribute, .. } => criteria
                .iter()
                .filter(|(name, _)| *name != attribute)
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            Route::Scan => criteria.clone(),
        };
        let filter = match Condition::matching(&remaining) {
            Some(matching) => matching.and(Condition::not_deleted()),
            None => Condition::not_deleted(),
        };
        let exclusive_start_key = request.exclusive_start_key.as_deref().map(ItemKey::new);

        let table = self.table(kind);
        let page = match &route {
            Route::Index { name, value, .. } => self.backend.query(
                table,
                &QueryRequest {
                    index: name.clone(),
                    value: value.clone(),
                    filter: Some(filter),
                    limit: None,
                    exclusive_start_key,
                },
            )?,
            Route::Scan => self.backend.scan(
                table,
                &ScanRequest {
                    filter: Some(filter),
                    limit: None,
                    segment: None,
                    exclusive_start_key,
                },
            )?,
        };
        self.metrics.increment_queries_executed();

        let route_name = match &route {
            Route::Index { name, .. } => name.as_str(),
            Route::Scan => "scan",
        };
        trace_event(
            Event::ItemsFound,
            &[
                ("table", table),
                ("route", route_name),
                ("scanned", page.scanned_count.to_string().as_str()),
                ("returned", page.items.len().to_string().as_str()),
            ],
        );

        Ok(self.truncate(page, request.limit))
    }

    fn route(&self, kind: TableKind, criteria: &Item) -> Route {
        let table = self.table(kind);
        let declared = match kind {
            TableKind::Resource => &self.config.table_indexes,
            TableKind::Metadata => &self.config.metadata_indexes,
        };
        let mut candidates: Vec<(String, String, AttributeType)> = declared
            .iter()
            .map(|index| {
                (
                    params::index_name(table, &index.attribute),
                    index.attribute.clone(),
                    index.attribute_type,
                )
            })
            .collect();
        if kind == TableKind::Resource {
            candidates.push((
                params::index_name(&self.resource_table, params::ITEM_MASTER_ID),
                params::ITEM_MASTER_ID.to_string(),
                AttributeType::String,
            ));
        }

        candidates
            .into_iter()
            .find_map(|(name, attribute, attribute_type)| {
                let value = criteria.get(&attribute)?;
                // Values of another type are never indexed
                attribute_type.accepts(value).then(|| Route::Index {
                    name,
                    attribute,
                    value: value.clone(),
                })
            })
            .unwrap_or(Route::Scan)
    }

    /// Cuts a page down to the requested limit or the maximum response size.
    /// A cut page resumes after its last returned item.
    fn truncate(&self, page: Page, limit: Option<usize>) -> ItemPage {
        let cap = limit.unwrap_or(self.max_response_size).clamp(1, self.max_response_size);
        if page.items.len() <= cap {
            return ItemPage {
                items: page.items,
                last_evaluated_key: page.last_evaluated_key.map(|k| k.hash),
            };
        }

        let mut items = page.items;
        items.truncate(cap);
        let last_evaluated_key = items
            .last()
            .and_then(|item| item.get(&self.config.primary_key))
            .and_then(Value::as_str)
            .map(str::to_string);
        ItemPage {
            items,
            last_evaluated_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fixture, fixture_with, item, put};
    use super::super::types::{DeleteRequest, ItemUpdate};
    use super::*;
    use crate::config::{IndexDefinition, NamespaceConfig};
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn ids(page: &ItemPage) -> Vec<String> {
        page.items
            .iter()
            .map(|i| i["id"].as_str().unwrap().to_string())
            .collect()
    }

    fn find_resource(criteria: Value, limit: Option<usize>, start: Option<String>) -> FindRequest {
        FindRequest {
            resource: Some(item(criteria)),
            limit,
            exclusive_start_key: start,
            ..FindRequest::default()
        }
    }

    #[test]
    fn test_list_excludes_deleted() {
        let f = fixture();
        for id in ["A", "B", "C"] {
            put(&f.engine, id, json!({"color": "red"}));
        }
        f.engine.delete("B", DeleteRequest::whole_item(), "t").unwrap();
        let page = f.engine.list(&ListRequest::default()).unwrap();
        assert_eq!(ids(&page), vec!["A", "C"]);
        assert!(page.last_evaluated_key.is_none());
    }

    #[test]
    fn test_list_pagination_covers_everything_once() {
        let f = fixture();
        let expected: BTreeSet<String> = (0..23).map(|i| format!("item-{:02}", i)).collect();
        for id in &expected {
            put(&f.engine, id, json!({"n": 1}));
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = f
                .engine
                .list(&ListRequest {
                    limit: Some(5),
                    exclusive_start_key: token.clone(),
                    ..ListRequest::default()
                })
                .unwrap();
            assert!(page.items.len() <= 5);
            seen.extend(ids(&page));
            match page.last_evaluated_key {
                Some(key) => token = Some(key),
                None => break,
            }
        }
        assert_eq!(seen.len(), expected.len());
        assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn test_list_segments_partition_items() {
        let f = fixture();
        for i in 0..20 {
            put(&f.engine, &format!("item-{}", i), json!({"n": i}));
        }
        let mut all = BTreeSet::new();
        for segment in 0..3 {
            let page = f
                .engine
                .list(&ListRequest {
                    segment: Some(segment),
                    total_segments: Some(3),
                    ..ListRequest::default()
                })
                .unwrap();
            for id in ids(&page) {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 20);
    }

    #[test]
    fn test_list_segment_arguments() {
        let f = fixture();
        let missing_total = ListRequest {
            segment: Some(0),
            ..ListRequest::default()
        };
        assert_eq!(f.engine.list(&missing_total).unwrap_err().kind(), ErrorKind::InvalidArguments);
        let out_of_range = ListRequest {
            segment: Some(3),
            total_segments: Some(3),
            ..ListRequest::default()
        };
        assert_eq!(f.engine.list(&out_of_range).unwrap_err().kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_find_index_matches_scan() {
        let f = fixture();
        for i in 0..30 {
            let color = ["red", "blue", "green"][i % 3];
            put(&f.engine, &format!("item-{:02}", i), json!({"color": color, "size": i % 2, "shape": color}));
        }
        f.engine.delete("item-03", DeleteRequest::whole_item(), "t").unwrap();

        // color is indexed, shape is not; both carry the same values
        let indexed = f.engine.find(&find_resource(json!({"color": "red", "size": 1}), None, None)).unwrap();
        let scanned = f.engine.find(&find_resource(json!({"shape": "red", "size": 1}), None, None)).unwrap();
        let a: BTreeSet<String> = ids(&indexed).into_iter().collect();
        let b: BTreeSet<String> = ids(&scanned).into_iter().collect();
        assert!(!a.is_empty());
        assert!(!a.contains("item-03"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_find_route_priority() {
        let mut config = NamespaceConfig::new("orders", "id");
        config.table_indexes = vec![
            IndexDefinition::parse("size=number").unwrap(),
            IndexDefinition::parse("color").unwrap(),
        ];
        let f = fixture_with(config);
        let criteria = item(json!({"color": "red", "size": 2, "ItemMasterID": "M"}));
        match f.engine.route(TableKind::Resource, &criteria) {
            Route::Index { name, .. } => assert_eq!(name, "orders-dev-size"),
            Route::Scan => panic!("expected an index route"),
        }

        let master_only = item(json!({"ItemMasterID": "M", "shape": "x"}));
        match f.engine.route(TableKind::Resource, &master_only) {
            Route::Index { name, .. } => assert_eq!(name, "orders-dev-ItemMasterID"),
            Route::Scan => panic!("expected an index route"),
        }

        // A string where the index holds numbers falls back to a scan
        let mistyped = item(json!({"size": "2"}));
        assert_eq!(f.engine.route(TableKind::Resource, &mistyped), Route::Scan);
        assert_eq!(f.engine.route(TableKind::Metadata, &master_only), Route::Scan);
    }

    #[test]
    fn test_find_by_item_master() {
        let f = fixture();
        for id in ["M", "A", "B", "C"] {
            put(&f.engine, id, json!({"color": "red"}));
        }
        f.engine
            .item_master_update(&["A".to_string(), "C".to_string()], "M", "t")
            .unwrap();
        let page = f.engine.find(&find_resource(json!({"ItemMasterID": "M"}), None, None)).unwrap();
        assert_eq!(ids(&page), vec!["A", "C"]);
    }

    #[test]
    fn test_find_metadata() {
        let f = fixture();
        put(&f.engine, "A", json!({"color": "red"}));
        f.engine
            .update(
                "A",
                ItemUpdate {
                    metadata: Some(item(json!({"owner": "ops"}))),
                    ..ItemUpdate::default()
                },
                "t",
            )
            .unwrap();
        let page = f
            .engine
            .find(&FindRequest {
                metadata: Some(item(json!({"owner": "ops"}))),
                ..FindRequest::default()
            })
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["id"], json!("A-meta"));
    }

    #[test]
    fn test_find_requires_exactly_one_criteria_set() {
        let f = fixture();
        assert!(f.engine.find(&FindRequest::default()).is_err());
        let both = FindRequest {
            resource: Some(item(json!({"a": 1}))),
            metadata: Some(item(json!({"b": 1}))),
            ..FindRequest::default()
        };
        assert_eq!(f.engine.find(&both).unwrap_err().kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_find_truncates_and_resumes() {
        let f = fixture();
        for i in 0..12 {
            put(&f.engine, &format!("item-{:02}", i), json!({"color": "red"}));
        }

        for criteria in [json!({"color": "red"}), json!({"color": "red", "kind": "order"})] {
            let mut seen = Vec::new();
            let mut token = None;
            loop {
                let page = f.engine.find(&find_resource(criteria.clone(), Some(5), token.clone())).unwrap();
                assert!(page.items.len() <= 5);
                seen.extend(ids(&page));
                match page.last_evaluated_key {
                    Some(key) => token = Some(key),
                    None => break,
                }
            }
            if criteria.get("kind").is_none() {
                assert_eq!(seen.len(), 12);
                assert_eq!(seen.iter().collect::<BTreeSet<_>>().len(), 12);
            } else {
                assert!(seen.is_empty());
            }
        }
    }
}
