//! Versioning and conditional-write tests
//!
//! - every successful update moves ItemVersion forward by exactly one
//! - a stale version under strict OCCV fails and changes nothing
//! - concurrent writers holding the same version: exactly one wins
//! - non-master writes follow the namespace policy

use std::sync::Arc;
use std::thread;

use dataapi::api::{DataApi, MasterOption, UpdateBody};
use dataapi::config::{DataApiSettings, NamespaceConfig};
use dataapi::storage::Item;
use dataapi::{ErrorKind, InstanceCache};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

fn fields(value: Value) -> Item {
    value.as_object().cloned().expect("object literal")
}

fn namespace(config: NamespaceConfig) -> (InstanceCache, Arc<DataApi>) {
    let cache = InstanceCache::open(DataApiSettings::default()).unwrap();
    let api = cache.provision(config, "admin").unwrap();
    (cache, api)
}

fn strict() -> NamespaceConfig {
    let mut config = NamespaceConfig::new("orders", "id");
    config.strict_occv = true;
    config
}

fn versioned(resource: Value, version: Option<i64>) -> UpdateBody {
    UpdateBody {
        item_version: version,
        ..UpdateBody::resource(fields(resource))
    }
}

fn stored(api: &DataApi, id: &str) -> Item {
    api.get(id, MasterOption::ItemOnly, true)
        .unwrap()
        .item
        .resource
        .unwrap()
}

fn version_of(api: &DataApi, id: &str) -> i64 {
    stored(api, id)["ItemVersion"].as_i64().unwrap()
}

// =============================================================================
// Version Increments
// =============================================================================

/// Each update adds exactly one, starting from one
#[test]
fn test_version_increments_by_one() {
    let (_cache, api) = namespace(NamespaceConfig::new("orders", "id"));
    for n in 1..=5 {
        api.update("A", UpdateBody::resource(fields(json!({"n": n}))), "tester")
            .unwrap();
        assert_eq!(version_of(&api, "A"), n);
    }
}

/// Stale version fails, current version succeeds and moves to the next
#[test]
fn test_strict_occv_example() {
    let (_cache, api) = namespace(strict());
    api.update("A", versioned(json!({"color": "red"}), None), "tester").unwrap();
    api.update("A", versioned(json!({"color": "red"}), Some(1)), "tester").unwrap();
    api.update("A", versioned(json!({"color": "red"}), Some(2)), "tester").unwrap();
    assert_eq!(version_of(&api, "A"), 3);

    let before = stored(&api, "A");
    let err = api
        .update("A", versioned(json!({"color": "blue"}), Some(2)), "tester")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(stored(&api, "A"), before, "a failed write must not change the item");

    api.update("A", versioned(json!({"color": "blue"}), Some(3)), "tester").unwrap();
    let after = stored(&api, "A");
    assert_eq!(after["ItemVersion"], json!(4));
    assert_eq!(after["color"], json!("blue"));
}

/// Omitting the version under strict OCCV only creates
#[test]
fn test_strict_occv_requires_version_after_creation() {
    let (_cache, api) = namespace(strict());
    api.update("A", versioned(json!({"n": 1}), None), "tester").unwrap();
    let err = api.update("A", versioned(json!({"n": 2}), None), "tester").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

/// Callers racing with the same version: one write wins
#[test]
fn test_concurrent_writers_single_winner() {
    let (_cache, api) = namespace(strict());
    api.update("A", versioned(json!({"writer": "none"}), None), "tester").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let api = Arc::clone(&api);
            thread::spawn(move || {
                api.update("A", versioned(json!({"writer": i}), Some(1)), "tester")
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(version_of(&api, "A"), 2);
}

/// Caller constraints are part of the write condition
#[test]
fn test_constraints_guard_update() {
    let (_cache, api) = namespace(NamespaceConfig::new("orders", "id"));
    api.update("A", UpdateBody::resource(fields(json!({"state": "open"}))), "tester")
        .unwrap();

    let guarded = |state: &str| UpdateBody {
        constraints: Some(fields(json!({"state": state}))),
        ..UpdateBody::resource(fields(json!({"state": "closed"})))
    };
    assert_eq!(
        api.update("A", guarded("pending"), "tester").unwrap_err().kind(),
        ErrorKind::ConstraintViolation
    );
    api.update("A", guarded("open"), "tester").unwrap();
    assert_eq!(stored(&api, "A")["state"], json!("closed"));
}

// =============================================================================
// Item Master Write Policy
// =============================================================================

#[test]
fn test_non_master_writes_disallowed() {
    let mut config = NamespaceConfig::new("orders", "id");
    config.non_item_master_writes_allowed = false;
    let (_cache, api) = namespace(config);
    api.update("M", UpdateBody::resource(fields(json!({"n": 1}))), "tester").unwrap();
    api.update("A", UpdateBody::resource(fields(json!({"n": 1}))), "tester").unwrap();
    api.set_item_master(&["A".to_string()], "M", "tester").unwrap();

    let err = api
        .update("A", UpdateBody::resource(fields(json!({"n": 2}))), "tester")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(stored(&api, "A")["n"], json!(1));

    api.update("M", UpdateBody::resource(fields(json!({"n": 2}))), "tester").unwrap();
}

#[test]
fn test_non_master_writes_allowed_with_warning() {
    let (_cache, api) = namespace(NamespaceConfig::new("orders", "id"));
    api.update("M", UpdateBody::resource(fields(json!({"n": 1}))), "tester").unwrap();
    api.update("A", UpdateBody::resource(fields(json!({"n": 1}))), "tester").unwrap();
    api.set_item_master(&["A".to_string()], "M", "tester").unwrap();

    let response = api
        .update("A", UpdateBody::resource(fields(json!({"n": 2}))), "tester")
        .unwrap();
    assert_eq!(
        response.warnings,
        vec![json!({"Message": "Updated Non Item Master", "id": "A", "ItemMasterID": "M"})]
    );
    assert_eq!(stored(&api, "A")["n"], json!(2));
}
