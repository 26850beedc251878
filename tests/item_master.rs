//! Item master linkage tests

use std::sync::Arc;

use dataapi::api::{DataApi, MasterOption, UpdateBody};
use dataapi::config::{DataApiSettings, NamespaceConfig};
use dataapi::engine::{DeleteRequest, FindRequest};
use dataapi::{ErrorKind, InstanceCache};
use serde_json::json;

fn namespace() -> (InstanceCache, Arc<DataApi>) {
    let cache = InstanceCache::open(DataApiSettings::default()).unwrap();
    let api = cache
        .provision(NamespaceConfig::new("parts", "part_id"), "admin")
        .unwrap();
    for id in ["M", "A", "B", "C"] {
        let body = UpdateBody::parse(json!({"Resource": {"name": id}})).unwrap();
        api.update(id, body, "tester").unwrap();
    }
    (cache, api)
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_each_id_reports_its_own_outcome() {
    let (_cache, api) = namespace();
    api.delete("C", DeleteRequest::whole_item(), "tester").unwrap();

    let outcomes = api
        .set_item_master(&ids(&["A", "missing", "B", "M", "C", " "]), "M", "tester")
        .unwrap();
    let reported: Vec<(&str, bool)> = outcomes.iter().map(|o| (o.id.as_str(), o.updated)).collect();
    assert_eq!(
        reported,
        vec![("A", true), ("missing", false), ("B", true), ("M", false), ("C", false)]
    );

    let linked = api
        .find(&FindRequest {
            resource: json!({"ItemMasterID": "M"}).as_object().cloned(),
            ..FindRequest::default()
        })
        .unwrap();
    let mut linked: Vec<String> = linked
        .items
        .iter()
        .map(|view| view.resource.as_ref().unwrap()["part_id"].as_str().unwrap().to_string())
        .collect();
    linked.sort();
    assert_eq!(linked, ids(&["A", "B"]));
}

#[test]
fn test_master_must_be_live_and_unlinked() {
    let (_cache, api) = namespace();
    let err = api.set_item_master(&ids(&["A"]), "missing", "tester").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);

    api.set_item_master(&ids(&["A"]), "M", "tester").unwrap();
    let err = api.set_item_master(&ids(&["B"]), "A", "tester").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);

    api.delete("M", DeleteRequest::whole_item(), "tester").unwrap();
    let err = api.set_item_master(&ids(&["B"]), "M", "tester").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
}

#[test]
fn test_master_of_others_cannot_be_linked() {
    let (_cache, api) = namespace();
    api.set_item_master(&ids(&["B"]), "A", "tester").unwrap();

    let outcomes = api.set_item_master(&ids(&["A", "C"]), "M", "tester").unwrap();
    let reported: Vec<(&str, bool)> = outcomes.iter().map(|o| (o.id.as_str(), o.updated)).collect();
    assert_eq!(reported, vec![("A", false), ("C", true)]);

    let a = api.get("A", MasterOption::ItemOnly, true).unwrap();
    assert!(a.item.resource.unwrap().get("ItemMasterID").is_none());
    let b = api.get("B", MasterOption::ItemOnly, true).unwrap();
    assert_eq!(b.item.resource.unwrap()["ItemMasterID"], json!("A"));
}

#[test]
fn test_remove_requires_matching_assertion() {
    let (_cache, api) = namespace();
    api.set_item_master(&ids(&["A"]), "M", "tester").unwrap();

    let err = api.remove_item_master("A", "B", "tester").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(api.get("A", MasterOption::Include, true).unwrap().master.is_some());

    assert!(api.remove_item_master("A", "M", "tester").unwrap());
    assert!(api.get("A", MasterOption::Include, true).unwrap().master.is_none());
    assert!(!api.remove_item_master("A", "M", "tester").unwrap());
}

#[test]
fn test_item_master_addressable_by_arn() {
    let (_cache, api) = namespace();
    let master = api.address("M");
    let outcomes = api.set_item_master(&[api.address("A")], &master, "tester").unwrap();
    assert!(outcomes[0].updated);
    assert_eq!(outcomes[0].id, "A");

    let prefer = api.get(&api.address("A"), MasterOption::Prefer, true).unwrap();
    let identity = prefer.master.unwrap();
    assert_eq!(identity.item_arn, master);
    assert_eq!(identity.resource.unwrap()["part_id"], json!("M"));
}

/// Linking a master does not count as a versioned update
#[test]
fn test_linking_keeps_item_version() {
    let (_cache, api) = namespace();
    let before = api.get("A", MasterOption::ItemOnly, true).unwrap().item.resource.unwrap();
    api.set_item_master(&ids(&["A"]), "M", "tester").unwrap();
    let after = api.get("A", MasterOption::ItemOnly, true).unwrap().item.resource.unwrap();
    assert_eq!(before["ItemVersion"], after["ItemVersion"]);
    assert_eq!(after["ItemMasterID"], json!("M"));
    assert_eq!(after["LastUpdateAction"], json!("item-master"));
}
