use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    store: StoreHealth,
    task_queue: String,
}

#[derive(Serialize)]
pub struct StoreHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Checks store connectivity and reports which task transport is active.
/// Returns 200 OK if the store is reachable, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.deps.searches.ping(),
    )
    .await
    {
        Ok(Ok(())) => StoreHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => StoreHealth {
            status: "error".to_string(),
            error: Some(format!("Ping failed: {}", e)),
        },
        Err(_) => StoreHealth {
            status: "error".to_string(),
            error: Some("Ping timeout (>5s)".to_string()),
        },
    };

    let is_healthy = store.status == "ok";

    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            store,
            task_queue: state.deps.task_queue.mode().to_string(),
        }),
    )
}
