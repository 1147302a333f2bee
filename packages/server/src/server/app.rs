//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::matching::{MatchStore, SearchStatusReader, TaskIntake};
use crate::domains::meetings::MeetingCoordinator;
use crate::domains::search::SearchRegistry;
use crate::kernel::{ExpirySweeper, RetentionPurge, ServerDeps};
use crate::server::routes::{
    accept_meeting_handler, cancel_search_handler, create_meeting_handler, health_handler,
    meeting_status_handler, search_status_handler, submit_search_handler, sweep_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    pub registry: Arc<SearchRegistry>,
    pub intake: Arc<TaskIntake>,
    pub status: Arc<SearchStatusReader>,
    pub meetings: Arc<MeetingCoordinator>,
    pub sweeper: Arc<ExpirySweeper>,
    pub purge: Arc<RetentionPurge>,
}

impl AppState {
    /// Wire every service over one set of dependencies.
    pub fn new(deps: ServerDeps) -> Self {
        let settings = deps.settings.clone();

        let registry = Arc::new(SearchRegistry::new(deps.searches.clone(), settings.clone()));
        let store = Arc::new(MatchStore::new(
            deps.matches.clone(),
            deps.notifier.clone(),
            settings.collaborator_timeout,
        ));
        let intake = Arc::new(TaskIntake::new(
            registry.clone(),
            store,
            deps.task_queue.clone(),
        ));
        let status = Arc::new(SearchStatusReader::new(
            registry.clone(),
            deps.matches.clone(),
            deps.accounts.clone(),
            deps.venues.clone(),
            settings.collaborator_timeout,
        ));
        let meetings = Arc::new(MeetingCoordinator::new(
            deps.meetings.clone(),
            settings.clone(),
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            deps.searches.clone(),
            deps.matches.clone(),
        ));
        let purge = Arc::new(RetentionPurge::new(
            deps.searches.clone(),
            deps.matches.clone(),
            deps.meetings.clone(),
            settings.retention(),
        ));

        Self {
            deps: Arc::new(deps),
            registry,
            intake,
            status,
            meetings,
            sweeper,
            purge,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/search", post(submit_search_handler))
        .route("/search/:id/status", get(search_status_handler))
        .route("/search/:id/cancel", post(cancel_search_handler))
        .route("/meeting", post(create_meeting_handler))
        .route("/meeting/:id/accept", post(accept_meeting_handler))
        .route("/meeting/:id/status", get(meeting_status_handler))
        .route("/admin/sweep", post(sweep_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
