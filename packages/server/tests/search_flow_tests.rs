//! Search and matching over HTTP, on the in-memory store.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use crate::common::TestApp;
use mealmatch_core::kernel::test_dependencies::{MockAccountDirectory, MockVenueCatalog};

#[tokio::test]
async fn nearby_users_at_same_venue_get_one_match() {
    let app = TestApp::new();

    let ann = app.search("ann@example.com", 1.3000, 103.8000, Some("Curry House")).await;
    let (status, bob) = app
        .post(
            "/search",
            json!({
                "userId": "bob@example.com",
                "location": {"lat": 1.3010, "lng": 103.8005},
                "venueFilter": {"name": "Curry House"},
                "proximityThresholdKm": 2.0
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bob["directMatchCount"], 1);
    assert!(bob["expiresAt"].is_string());

    let (status, report) = app
        .get(&format!("/search/{}/status?userId=ann@example.com", ann))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["proximityThresholdKm"], 2.0);

    let matches = report["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["userId"], "ann@example.com");
    assert_eq!(matches[0]["matchUserId"], "bob@example.com");
    assert_eq!(matches[0]["distanceKm"], 0.12);
    assert_eq!(matches[0]["status"], "pending");

    assert_eq!(app.notifier.events().len(), 1);
}

#[tokio::test]
async fn resubmitting_never_duplicates_a_pair() {
    let mut app = TestApp::new();

    for _ in 0..3 {
        app.search("ann@example.com", 1.3, 103.8, None).await;
        app.search("bob@example.com", 1.3, 103.8, None).await;
    }
    app.drain_tasks().await;

    assert_eq!(app.store.search_request_count(), 6);
    assert_eq!(app.store.all_matches().len(), 1);
    assert_eq!(app.notifier.events().len(), 1);
}

#[tokio::test]
async fn different_venues_do_not_match() {
    let app = TestApp::new();

    app.search("ann@example.com", 1.3, 103.8, Some("Curry House")).await;
    let (_, bob) = app
        .post(
            "/search",
            json!({
                "userId": "bob@example.com",
                "location": {"latitude": 1.3, "longitude": 103.8},
                "venueFilter": "Noodle Bar"
            }),
        )
        .await;

    assert_eq!(bob["directMatchCount"], 0);
    assert!(app.store.all_matches().is_empty());
}

#[tokio::test]
async fn background_processing_marks_requests_completed() {
    let mut app = TestApp::new();
    let ann = app.search("ann@example.com", 1.3, 103.8, None).await;

    let (_, report) = app.get(&format!("/search/{}/status", ann)).await;
    assert_eq!(report["status"], "processing");

    assert_eq!(app.drain_tasks().await, 1);

    let (_, report) = app.get(&format!("/search/{}/status", ann)).await;
    assert_eq!(report["status"], "completed");
}

#[tokio::test]
async fn cancel_expires_request_and_sweep_expires_its_matches() {
    let app = TestApp::new();
    let ann = app.search("ann@example.com", 1.3, 103.8, None).await;
    app.search("bob@example.com", 1.3, 103.8, None).await;
    assert_eq!(app.store.all_matches().len(), 1);

    let (status, cancelled) = app
        .post(
            &format!("/search/{}/cancel", ann),
            json!({"userId": "ann@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "expired");

    let (status, report) = app.post("/admin/sweep", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["expiredMatches"], 1);

    let (_, status_report) = app.get(&format!("/search/{}/status", ann)).await;
    assert_eq!(status_report["status"], "expired");
    assert!(status_report["matches"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_by_another_user_is_rejected() {
    let app = TestApp::new();
    let ann = app.search("ann@example.com", 1.3, 103.8, None).await;

    let (status, body) = app
        .post(
            &format!("/search/{}/cancel", ann),
            json!({"userId": "bob@example.com"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn invalid_input_is_a_client_error() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/search", json!({"location": {"lat": 1.3, "lng": 103.8}}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request: userId is required");

    let (status, _) = app
        .post(
            "/search",
            json!({"userId": "ann@example.com", "location": {"lat": 95.0, "lng": 0.0}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/search/not-a-uuid/status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .get("/search/0190c2a4-7b1e-7c3d-9f00-000000000000/status")
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn status_is_enriched_from_collaborators() {
    let app = TestApp::with_collaborators(
        MockAccountDirectory::new().with_name("bob@example.com", "Bob"),
        MockVenueCatalog::new().with_venue("Curry House", json!({"address": "1 Spice Rd"})),
    );
    let ann = app.search("ann@example.com", 1.3, 103.8, Some("Curry House")).await;
    app.search("bob@example.com", 1.3, 103.8, Some("Curry House")).await;
    app.search("cat@example.com", 1.3, 103.8, None).await;

    let (_, report) = app.get(&format!("/search/{}/status", ann)).await;
    let matches = report["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);

    let bob = matches
        .iter()
        .find(|m| m["matchUserId"] == "bob@example.com")
        .unwrap();
    assert_eq!(bob["matchName"], "Bob");
    assert_eq!(bob["venueDetails"]["address"], "1 Spice Rd");

    let cat = matches
        .iter()
        .find(|m| m["matchUserId"] == "cat@example.com")
        .unwrap();
    assert_eq!(cat["matchName"], "Unknown User");
}

#[tokio::test]
async fn health_reports_store_and_queue_mode() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["task_queue"], "memory");
}
