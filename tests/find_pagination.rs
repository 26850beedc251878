//! Search and pagination tests
//!
//! - an indexed find returns the same items as a scan with the same criteria
//! - following resume tokens visits every live item exactly once
//! - parallel scan segments partition the table

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dataapi::api::{parse_find, parse_list, DataApi, FindResponse, UpdateBody};
use dataapi::config::{DataApiSettings, IndexDefinition, NamespaceConfig};
use dataapi::engine::{DeleteRequest, FindRequest, ListRequest};
use dataapi::storage::Item;
use dataapi::{ErrorKind, InstanceCache};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

const ITEMS: usize = 60;
const COLORS: [&str; 4] = ["red", "blue", "green", "black"];

fn fields(value: Value) -> Item {
    value.as_object().cloned().expect("object literal")
}

/// Namespace with `color` and `size` indexed; `shade` mirrors `color` unindexed
fn populated() -> (InstanceCache, Arc<DataApi>) {
    let cache = InstanceCache::open(DataApiSettings::default()).unwrap();
    let mut config = NamespaceConfig::new("orders", "id");
    config.table_indexes = vec![
        IndexDefinition::parse("color").unwrap(),
        IndexDefinition::parse("size=number").unwrap(),
    ];
    config.metadata_indexes = vec![IndexDefinition::parse("owner").unwrap()];
    let api = cache.provision(config, "admin").unwrap();

    for i in 0..ITEMS {
        let color = COLORS[i % COLORS.len()];
        let body = UpdateBody::parse(json!({
            "Resource": {"color": color, "shade": color, "size": i % 3, "parity": i % 2},
            "Metadata": {"owner": if i % 5 == 0 { "ops" } else { "dev" }}
        }))
        .unwrap();
        api.update(&format!("item-{:03}", i), body, "loader").unwrap();
    }
    for i in (0..ITEMS).step_by(7) {
        api.delete(&format!("item-{:03}", i), DeleteRequest::whole_item(), "loader")
            .unwrap();
    }
    (cache, api)
}

fn is_live(i: usize) -> bool {
    i % 7 != 0
}

fn ids(response: &FindResponse) -> Vec<String> {
    response
        .items
        .iter()
        .map(|view| view.item_arn.rsplit(':').next().unwrap().to_string())
        .collect()
}

fn find_all(api: &DataApi, criteria: Value, limit: Option<usize>) -> Vec<String> {
    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut body = json!({"Resource": criteria.clone()});
        if let Some(limit) = limit {
            body["Limit"] = json!(limit);
        }
        if let Some(token) = &token {
            body["ExclusiveStartKey"] = json!(token);
        }
        let page = api.find(&parse_find(body).unwrap()).unwrap();
        if let Some(limit) = limit {
            assert!(page.items.len() <= limit);
        }
        seen.extend(ids(&page));
        match page.last_evaluated_key {
            Some(next) => token = Some(next),
            None => return seen,
        }
    }
}

// =============================================================================
// Index Routing
// =============================================================================

/// Indexed and scanned finds agree for every color and size
#[test]
fn test_index_and_scan_agree() {
    let (_cache, api) = populated();
    for color in COLORS {
        for size in 0..3 {
            let indexed: BTreeSet<String> = find_all(&api, json!({"color": color, "parity": 1}), None)
                .into_iter()
                .collect();
            let scanned: BTreeSet<String> = find_all(&api, json!({"shade": color, "parity": 1}), None)
                .into_iter()
                .collect();
            assert_eq!(indexed, scanned, "color {}", color);

            let by_size: BTreeSet<String> = find_all(&api, json!({"size": size, "shade": color}), None)
                .into_iter()
                .collect();
            let expected: BTreeSet<String> = (0..ITEMS)
                .filter(|i| is_live(*i) && i % 3 == size && COLORS[i % COLORS.len()] == color)
                .map(|i| format!("item-{:03}", i))
                .collect();
            assert_eq!(by_size, expected, "size {} color {}", size, color);
        }
    }
}

/// A value of the wrong type for its index still finds matches by scanning
#[test]
fn test_mistyped_criteria_fall_back_to_scan() {
    let (_cache, api) = populated();
    api.update("odd", UpdateBody::resource(fields(json!({"size": "large"}))), "loader")
        .unwrap();
    assert_eq!(find_all(&api, json!({"size": "large"}), None), vec!["odd".to_string()]);
}

#[test]
fn test_find_metadata_addresses_resource() {
    let (_cache, api) = populated();
    let request = FindRequest {
        metadata: Some(fields(json!({"owner": "ops"}))),
        ..FindRequest::default()
    };
    let found: BTreeSet<String> = ids(&api.find(&request).unwrap()).into_iter().collect();
    // Deleting a Resource leaves its Metadata record in place
    let expected: BTreeSet<String> = (0..ITEMS)
        .filter(|i| i % 5 == 0)
        .map(|i| format!("item-{:03}", i))
        .collect();
    assert_eq!(found, expected);
}

#[test]
fn test_find_request_shape() {
    let (_cache, api) = populated();
    let both = parse_find(json!({"Resource": {"color": "red"}, "Metadata": {"owner": "ops"}})).unwrap();
    assert_eq!(api.find(&both).unwrap_err().kind(), ErrorKind::InvalidArguments);
    let neither = parse_find(json!({"Limit": 3})).unwrap();
    assert_eq!(api.find(&neither).unwrap_err().kind(), ErrorKind::InvalidArguments);
}

// =============================================================================
// Pagination
// =============================================================================

#[test]
fn test_find_pagination_has_no_gaps_or_duplicates() {
    let (_cache, api) = populated();
    let unpaged = find_all(&api, json!({"color": "red"}), None);
    for limit in [1, 2, 5, 100] {
        let paged = find_all(&api, json!({"color": "red"}), Some(limit));
        assert_eq!(paged.len(), unpaged.len(), "limit {}", limit);
        assert_eq!(
            paged.iter().collect::<BTreeSet<_>>(),
            unpaged.iter().collect::<BTreeSet<_>>()
        );
    }
}

#[test]
fn test_list_pagination_visits_every_live_item() {
    let (_cache, api) = populated();
    let expected: BTreeSet<String> = (0..ITEMS)
        .filter(|i| is_live(*i))
        .map(|i| format!("item-{:03}", i))
        .collect();

    for limit in [1, 7, 50] {
        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = api
                .list(&ListRequest {
                    limit: Some(limit),
                    exclusive_start_key: token.clone(),
                    ..ListRequest::default()
                })
                .unwrap();
            seen.extend(
                page.items
                    .iter()
                    .map(|item| item["id"].as_str().unwrap().to_string()),
            );
            match page.last_evaluated_key {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len(), expected.len(), "limit {}", limit);
        assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), expected);
    }
}

#[test]
fn test_segments_partition_live_items() {
    let (_cache, api) = populated();
    let mut seen = BTreeSet::new();
    for segment in 0..4 {
        let mut query = BTreeMap::new();
        query.insert("Segment".to_string(), segment.to_string());
        query.insert("TotalSegments".to_string(), "4".to_string());
        let page = api.list(&parse_list(&query).unwrap()).unwrap();
        assert!(page.last_evaluated_key.is_none());
        for item in page.items {
            assert!(seen.insert(item["id"].as_str().unwrap().to_string()));
        }
    }
    assert_eq!(seen.len(), (0..ITEMS).filter(|i| is_live(*i)).count());
}

#[test]
fn test_segment_arguments_validated() {
    let (_cache, api) = populated();
    let mut query = BTreeMap::new();
    query.insert("Segment".to_string(), "1".to_string());
    let err = api.list(&parse_list(&query).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);

    query.insert("TotalSegments".to_string(), "1".to_string());
    let err = api.list(&parse_list(&query).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
}
