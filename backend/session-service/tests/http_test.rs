//! HTTP surface: routing, status codes, JSON shapes

mod common;

use actix_web::{test, web, App};
use prometheus::Registry;
use serde_json::{json, Value};
use session_service::handlers::{self, AppState};

fn state() -> AppState {
    let store = common::contended_store();
    let services = session_service::services::Services::new(
        store.clone(),
        session_cache::SessionCache::local_only(),
        &session_service::config::SessionConfig::default(),
    );
    let registry = Registry::new();
    session_service::metrics::register(&registry).unwrap();
    AppState {
        services,
        store,
        registry,
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_create_join_leave_flow() {
    let app = app!(state());

    let req = test::TestRequest::post()
        .uri("/resources")
        .set_json(json!({ "kind": "meeting", "owner_id": "owner-1", "capacity": 1 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let resource: Value = test::read_body_json(resp).await;
    let id = resource["id"].as_str().unwrap().to_string();
    assert_eq!(resource["capacity"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/resources/{}/join", id))
        .set_json(json!({ "participant_id": "alice" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let admitted: Value = test::read_body_json(resp).await;
    assert_eq!(admitted["status"], "admitted");
    let membership_id = admitted["membership"]["membership_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/resources/{}/join", id))
        .set_json(json!({ "participant_id": "bob" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let denied: Value = test::read_body_json(resp).await;
    assert_eq!(denied["reason"], "capacity_exceeded");

    let req = test::TestRequest::get()
        .uri(&format!("/resources/{}/active", id))
        .to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(active["count"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/resources/{}/memberships/{}/leave", id, membership_id))
        .to_request();
    let left: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(left["status"], "left");

    let req = test::TestRequest::get()
        .uri("/participants/alice/history")
        .to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history["events"].as_array().unwrap().len(), 2);
    assert!(history["next_cursor"].is_null());
}

#[actix_web::test]
async fn test_error_status_codes() {
    let app = app!(state());

    let req = test::TestRequest::get().uri("/resources/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["retryable"], false);

    let req = test::TestRequest::post()
        .uri("/resources")
        .set_json(json!({ "kind": "stream", "owner_id": "owner-1", "capacity": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_ledger_routes() {
    let app = app!(state());

    let req = test::TestRequest::post()
        .uri("/resources")
        .set_json(json!({ "kind": "stream", "owner_id": "host" }))
        .to_request();
    let resource: Value = test::call_and_read_body_json(&app, req).await;
    let id = resource["id"].as_str().unwrap().to_string();
    assert_eq!(resource["capacity"], 250);

    for (participant, amount) in [("p1", 10.0), ("p2", 15.0), ("p1", 10.0)] {
        let req = test::TestRequest::post()
            .uri(&format!("/resources/{}/ledger", id))
            .set_json(json!({ "participant_id": participant, "amount": amount, "message": "gg" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/resources/{}/ledger", id))
        .set_json(json!({ "participant_id": "p3", "amount": -5.0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::get()
        .uri(&format!("/resources/{}/leaderboard", id))
        .to_request();
    let board: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(board[0]["participant_id"], "p1");
    assert_eq!(board[0]["total"], 20.0);

    let req = test::TestRequest::get()
        .uri(&format!("/resources/{}/stats", id))
        .to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["total"], 35.0);
    assert_eq!(stats["top_contributor"], "p1");
}

#[actix_web::test]
async fn test_block_capacity_and_teardown_routes() {
    let app = app!(state());

    let req = test::TestRequest::post()
        .uri("/resources")
        .set_json(json!({ "kind": "meeting", "owner_id": "owner-1", "capacity": 2 }))
        .to_request();
    let resource: Value = test::call_and_read_body_json(&app, req).await;
    let id = resource["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/resources/{}/block", id))
            .set_json(json!({ "participant_id": "troll" }))
            .to_request();
        let blocked: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(blocked["block_list"].as_array().unwrap().len(), 1);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/resources/{}/join", id))
        .set_json(json!({ "participant_id": "troll" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/resources/{}/capacity", id))
        .set_json(json!({ "capacity": 8 }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["capacity"], 8);

    let req = test::TestRequest::delete()
        .uri(&format!("/resources/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/resources/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let app = app!(state());

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health["status"], "ok");

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}
