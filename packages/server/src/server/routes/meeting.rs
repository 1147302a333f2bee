use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::common::{MatchingError, MeetingEntity};
use crate::domains::meetings::{MeetingProposal, MeetingView};
use crate::server::app::AppState;
use crate::server::error::parse_id;
use crate::server::routes::search::ViewerQuery;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingBody {
    pub proposer_id: Option<String>,
    pub other_id: Option<String>,
    pub match_key: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default = "default_auto_accept")]
    pub auto_accept: bool,
    pub decision_timeout_secs: Option<i64>,
}

fn default_auto_accept() -> bool {
    true
}

pub async fn create_meeting_handler(
    Extension(state): Extension<AppState>,
    body: Result<Json<CreateMeetingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<MeetingView>), MatchingError> {
    let Json(body) = body?;
    let required = |field: Option<String>, name: &str| {
        field.ok_or_else(|| MatchingError::validation(format!("{} is required", name)))
    };

    let decision_timeout = body
        .decision_timeout_secs
        .map(|secs| {
            chrono::Duration::try_seconds(secs)
                .ok_or_else(|| MatchingError::validation("decisionTimeoutSecs is out of range"))
        })
        .transpose()?;

    let now = Utc::now();
    let meeting = state
        .meetings
        .create_or_join(
            MeetingProposal {
                match_key: required(body.match_key, "matchKey")?,
                proposer_id: required(body.proposer_id, "proposerId")?,
                other_id: required(body.other_id, "otherId")?,
                details: body.details,
                auto_accept: body.auto_accept,
                decision_timeout,
            },
            now,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(meeting.view(now))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMeetingBody {
    pub user_id: Option<String>,
    #[serde(default)]
    pub force_confirmation: bool,
}

pub async fn accept_meeting_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AcceptMeetingBody>, JsonRejection>,
) -> Result<Json<MeetingView>, MatchingError> {
    let id = parse_id::<MeetingEntity>(&id, "meeting")?;
    let Json(body) = body?;
    let user_id = body
        .user_id
        .ok_or_else(|| MatchingError::validation("userId is required"))?;

    let now = Utc::now();
    let meeting = state
        .meetings
        .accept(id, &user_id, body.force_confirmation, now)
        .await?;

    Ok(Json(meeting.view(now)))
}

pub async fn meeting_status_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<MeetingView>, MatchingError> {
    let id = parse_id::<MeetingEntity>(&id, "meeting")?;

    let view = state.meetings.status(id, query.user_id.as_deref()).await?;

    Ok(Json(view))
}
