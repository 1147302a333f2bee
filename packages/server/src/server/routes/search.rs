use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Coordinates, MatchingError, SearchRequestEntity, SearchRequestId, Venue};
use crate::domains::matching::SearchStatusReport;
use crate::domains::search::{SearchStatus, SearchSubmission};
use crate::server::app::AppState;
use crate::server::error::parse_id;

/// Clients send either a bare venue name or the catalog record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VenueInput {
    Name(String),
    Record(Venue),
}

impl From<VenueInput> for Venue {
    fn from(input: VenueInput) -> Self {
        match input {
            VenueInput::Name(name) => Venue::named(name),
            VenueInput::Record(venue) => venue,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSearchBody {
    pub user_id: Option<String>,
    pub location: Option<Coordinates>,
    pub venue_filter: Option<VenueInput>,
    pub proximity_threshold_km: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSearchResponse {
    pub request_id: SearchRequestId,
    pub expires_at: DateTime<Utc>,
    pub direct_match_count: usize,
}

pub async fn submit_search_handler(
    Extension(state): Extension<AppState>,
    body: Result<Json<SubmitSearchBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitSearchResponse>), MatchingError> {
    let Json(body) = body?;

    let user_id = body
        .user_id
        .ok_or_else(|| MatchingError::validation("userId is required"))?;
    let location = body
        .location
        .ok_or_else(|| MatchingError::validation("location is required"))?;

    let outcome = state
        .intake
        .submit(
            SearchSubmission {
                user_id,
                location,
                venue_filter: body.venue_filter.map(Venue::from),
                proximity_threshold_km: body.proximity_threshold_km,
            },
            Utc::now(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitSearchResponse {
            request_id: outcome.request.id,
            expires_at: outcome.request.expires_at,
            direct_match_count: outcome.direct_matches.len(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    pub user_id: Option<String>,
}

pub async fn search_status_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<SearchStatusReport>, MatchingError> {
    let id = parse_id::<SearchRequestEntity>(&id, "search request")?;

    let report = state
        .status
        .status(id, query.user_id.as_deref(), Utc::now())
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSearchBody {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSearchResponse {
    pub request_id: SearchRequestId,
    pub status: SearchStatus,
    pub expires_at: DateTime<Utc>,
}

/// The body is optional; when it names a user, that user must own the request.
pub async fn cancel_search_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelSearchBody>>,
) -> Result<Json<CancelSearchResponse>, MatchingError> {
    let id = parse_id::<SearchRequestEntity>(&id, "search request")?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let cancelled = state
        .registry
        .cancel(id, body.user_id.as_deref(), Utc::now())
        .await?;

    Ok(Json(CancelSearchResponse {
        request_id: cancelled.id,
        status: cancelled.status,
        expires_at: cancelled.expires_at,
    }))
}
