//! In-process app over the in-memory store, driven through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use mealmatch_core::config::MatchingSettings;
use mealmatch_core::kernel::jobs::InMemoryTaskSource;
use mealmatch_core::kernel::test_dependencies::{
    MockAccountDirectory, MockVenueCatalog, RecordingNotifier,
};
use mealmatch_core::kernel::{MemoryStore, TestDependencies};
use mealmatch_core::server::{build_app, AppState};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub tasks: InMemoryTaskSource,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(TestDependencies::new())
    }

    pub fn with_settings(settings: MatchingSettings) -> Self {
        Self::with(TestDependencies::new().settings(settings))
    }

    pub fn with_collaborators(accounts: MockAccountDirectory, venues: MockVenueCatalog) -> Self {
        Self::with(
            TestDependencies::new()
                .mock_accounts(accounts)
                .mock_venues(venues),
        )
    }

    fn with(deps: TestDependencies) -> Self {
        let store = deps.store.clone();
        let notifier = deps.notifier.clone();
        let (deps, tasks) = deps.into_deps();
        let state = AppState::new(deps);

        Self {
            router: build_app(state.clone()),
            state,
            store,
            notifier,
            tasks,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, json)
    }

    /// Run every queued search task through intake, as the worker would.
    pub async fn drain_tasks(&mut self) -> usize {
        let mut processed = 0;
        while let Some(task) = self.tasks.try_next() {
            self.state
                .intake
                .process(&task, chrono::Utc::now())
                .await
                .expect("task should process");
            processed += 1;
        }
        processed
    }

    /// Submit a search and return its request id.
    pub async fn search(&self, user: &str, lat: f64, lng: f64, venue: Option<&str>) -> String {
        let mut body = serde_json::json!({
            "userId": user,
            "location": {"lat": lat, "lng": lng},
        });
        if let Some(venue) = venue {
            body["venueFilter"] = serde_json::json!({"name": venue});
        }

        let (status, json) = self.post("/search", body).await;
        assert_eq!(status, StatusCode::CREATED, "search failed: {}", json);
        json["requestId"]
            .as_str()
            .expect("requestId in response")
            .to_string()
    }
}
