use axum::{extract::Extension, Json};
use chrono::Utc;
use tracing::info;

use crate::common::MatchingError;
use crate::kernel::SweepReport;
use crate::server::app::AppState;

/// Run one expiry sweep now instead of waiting for the next tick.
pub async fn sweep_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<SweepReport>, MatchingError> {
    let report = state.sweeper.sweep_once(Utc::now()).await?;
    info!(?report, "manual sweep");
    Ok(Json(report))
}
