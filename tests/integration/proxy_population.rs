//! Lazy population of proxies returned by managers

use conservator::connection::Connection;
use conservator::fields::FieldRequest;
use conservator::manager::Manager;
use conservator::schema::DATASETS;
use conservator::ApiError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn dataset(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("name of {}", id),
        "description": "road scenes",
        "owner": "fleet",
        "tags": ["day", "urban"],
        "createdAt": "2024-01-01T00:00:00Z",
        "modifiedAt": "2024-02-01T00:00:00Z",
        "frameCount": 12,
        "videoCount": 1,
        "gitCommitState": "committed",
        "collections": ["c1"],
        "repository": {"id": "r1", "master": "abc", "name": "repo"}
    })
}

/// Answers by-id lookups and one-page searches; records every document.
fn recording_server() -> (Connection, Arc<Mutex<Vec<String>>>) {
    let documents = Arc::new(Mutex::new(Vec::new()));
    let seen = documents.clone();
    let conn = Connection::new(move |doc: &str, vars: &Value| -> Result<Value, ApiError> {
        seen.lock().push(doc.to_string());
        if doc.contains("items:") {
            let items: Vec<Value> = ["d1", "d2"]
                .iter()
                .map(|id| json!({"id": id, "name": format!("name of {}", id)}))
                .collect();
            return Ok(json!({"data": {"items": items, "total": 2}}));
        }
        let id = vars["id"].as_str().unwrap_or_default();
        if id == "missing" {
            return Ok(json!({"data": {"dataset": null}}));
        }
        Ok(json!({"data": {"dataset": dataset(id)}}))
    });
    (conn, documents)
}

#[test]
fn test_populate_is_idempotent() {
    let (conn, docs) = recording_server();
    let manager = Manager::new(conn, &DATASETS);
    let mut proxy = manager.from_id("d1").unwrap();
    assert!(docs.lock().is_empty());

    let request = FieldRequest::create(["name", "repository.master"]).unwrap();
    proxy.populate(&request).unwrap();
    assert_eq!(docs.lock().len(), 1);
    assert_eq!(proxy.get("repository.master"), Some(&json!("abc")));

    proxy.populate(&request).unwrap();
    proxy.require(&["name"]).unwrap();
    assert_eq!(docs.lock().len(), 1);
}

#[test]
fn test_search_results_fetch_only_missing_fields() {
    let (conn, docs) = recording_server();
    let manager = Manager::new(conn, &DATASETS);
    let mut items = manager
        .search("")
        .unwrap()
        .with_fields(FieldRequest::create(["name"]).unwrap())
        .collect_all()
        .unwrap();
    assert_eq!(docs.lock().len(), 1);

    let first = &mut items[0];
    first
        .populate(&FieldRequest::create(["name", "owner"]).unwrap())
        .unwrap();
    let docs = docs.lock();
    assert_eq!(docs.len(), 2);
    assert!(docs[1].contains("owner"));
    assert!(!docs[1].contains("name"));
    assert_eq!(first.get("owner"), Some(&json!("fleet")));
}

#[test]
fn test_populate_all_then_nothing_left() {
    let (conn, docs) = recording_server();
    let manager = Manager::new(conn, &DATASETS);
    let mut proxy = manager.from_id("d7").unwrap();

    proxy.populate_all().unwrap();
    assert_eq!(docs.lock().len(), 1);
    assert!(docs.lock()[0].contains("gitCommitState"));
    assert_eq!(proxy.get("tags"), Some(&json!(["day", "urban"])));
    assert_eq!(proxy.get("repository.name"), Some(&json!("repo")));

    proxy.populate_all().unwrap();
    proxy
        .populate(&manager.default_fields().unwrap())
        .unwrap();
    assert_eq!(docs.lock().len(), 1);
}

#[test]
fn test_unknown_id_is_invalid() {
    let (conn, _) = recording_server();
    let manager = Manager::new(conn, &DATASETS);
    let err = manager.fetch("missing", None).unwrap_err();
    assert!(matches!(err, ApiError::InvalidId { ref id, .. } if id == "missing"));
}
