//! Search pagination through entity managers

use conservator::connection::Connection;
use conservator::manager::Manager;
use conservator::schema::{DATASETS, FRAMES};
use conservator::ApiError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Server answering page requests over `total` datasets. `totals` overrides
/// the reported total per request, in call order.
struct FakeServer {
    total: usize,
    totals: Vec<usize>,
    page_requests: usize,
    count_requests: usize,
}

fn serve(server: Arc<Mutex<FakeServer>>) -> Connection {
    Connection::new(move |doc: &str, vars: &Value| -> Result<Value, ApiError> {
        let mut server = server.lock();
        let call = server.page_requests + server.count_requests;
        let total = server.totals.get(call).copied().unwrap_or(server.total);
        if !doc.contains("items:") {
            server.count_requests += 1;
            return Ok(json!({"data": {"total": total}}));
        }
        server.page_requests += 1;

        assert_eq!(vars["searchText"], json!("cars"));
        let page = vars["page"].as_u64().unwrap() as usize;
        let limit = vars["limit"].as_u64().unwrap() as usize;
        let start = (page * limit).min(total);
        let end = (start + limit).min(total);
        let items: Vec<Value> = (start..end)
            .map(|i| {
                json!({
                    "id": format!("ds{:03}", i),
                    "name": format!("cars {}", i),
                    "owner": "fleet",
                    "frameCount": i,
                    "repository": {"master": format!("c{}", i)}
                })
            })
            .collect();
        Ok(json!({"data": {"items": items, "total": total}}))
    })
}

fn server(total: usize, totals: Vec<usize>) -> Arc<Mutex<FakeServer>> {
    Arc::new(Mutex::new(FakeServer {
        total,
        totals,
        page_requests: 0,
        count_requests: 0,
    }))
}

#[test]
fn test_page_count_is_ceiling_of_total_over_page_size() {
    for (total, page_size, pages) in [(23, 5, 5), (25, 5, 5), (1, 10, 1), (100, 100, 1)] {
        let state = server(total, Vec::new());
        let manager = Manager::new(serve(state.clone()), &DATASETS);
        let items = manager
            .search("cars")
            .unwrap()
            .page_size(page_size)
            .collect_all()
            .unwrap();

        assert_eq!(items.len(), total);
        assert_eq!(state.lock().page_requests, pages, "total {}", total);
        let mut ids: Vec<&str> = items.iter().map(|p| p.id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}

#[test]
fn test_search_results_carry_default_fields() {
    let manager = Manager::new(serve(server(3, Vec::new())), &DATASETS);
    let items = manager.search("cars").unwrap().collect_all().unwrap();
    assert_eq!(items[2].get("repository.master"), Some(&json!("c2")));
    assert_eq!(items[2].get("owner"), Some(&json!("fleet")));
    assert!(items[2].has_field("frameCount"));
}

#[test]
fn test_total_change_mid_iteration_aborts() {
    // Total drops from 12 to 11 when the third page is requested.
    let state = server(12, vec![12, 12, 11]);
    let manager = Manager::new(serve(state), &DATASETS);
    let query = manager.search("cars").unwrap().page_size(5);

    let results: Vec<_> = query.iter().collect();
    assert_eq!(results.len(), 11);
    assert!(results[..10].iter().all(Result::is_ok));
    assert!(matches!(
        results[10],
        Err(ApiError::ConcurrentQueryModification {
            page: 2,
            expected: 12,
            observed: 11
        })
    ));
}

#[test]
fn test_count_is_one_request() {
    let state = server(42, Vec::new());
    let manager = Manager::new(serve(state.clone()), &DATASETS);
    assert_eq!(manager.count("cars").unwrap(), 42);
    let state = state.lock();
    assert_eq!(state.count_requests, 1);
    assert_eq!(state.page_requests, 0);
}

#[test]
fn test_first_stops_early() {
    let state = server(50, Vec::new());
    let manager = Manager::new(serve(state.clone()), &DATASETS);
    let items = manager
        .search("cars")
        .unwrap()
        .page_size(10)
        .first(12)
        .collect_all()
        .unwrap();
    assert_eq!(items.len(), 12);
    assert_eq!(state.lock().page_requests, 2);
}

#[test]
fn test_unsearchable_entity_is_unsupported() {
    let manager = Manager::new(serve(server(0, Vec::new())), &FRAMES);
    assert!(matches!(
        manager.search("x"),
        Err(ApiError::Unsupported { .. })
    ));
}
