//! HTTP mapping for `MatchingError`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::common::{Id, MatchingError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl MatchingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchingError::Validation(_) => StatusCode::BAD_REQUEST,
            MatchingError::NotFound { .. } => StatusCode::NOT_FOUND,
            MatchingError::Conflict(_) => StatusCode::CONFLICT,
            MatchingError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MatchingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MatchingError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store details stay in the logs.
        let message = match &self {
            MatchingError::Persistence(e) => {
                error!(error = %e, "request failed on the store");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                code: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for MatchingError {
    fn from(rejection: JsonRejection) -> Self {
        MatchingError::validation(rejection.body_text())
    }
}

/// Parse a typed id from a path segment.
pub fn parse_id<T>(raw: &str, entity: &'static str) -> Result<Id<T>, MatchingError> {
    raw.trim()
        .parse()
        .map_err(|_| MatchingError::validation(format!("invalid {} id: {}", entity, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SearchRequestId;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MatchingError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MatchingError::not_found("Meeting", "1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(MatchingError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            MatchingError::UpstreamUnavailable("nats".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            MatchingError::Persistence(anyhow::anyhow!("db down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        let id = SearchRequestId::new();
        let parsed: SearchRequestId = parse_id(&id.to_string(), "search request").unwrap();
        assert_eq!(parsed, id);
        assert!(parse_id::<crate::common::SearchRequestEntity>("nope", "search request").is_err());
    }
}
