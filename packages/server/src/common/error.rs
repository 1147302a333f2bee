use thiserror::Error;

/// Errors surfaced by the matching pipeline and the meeting coordinator.
#[derive(Error, Debug)]
pub enum MatchingError {
    /// Missing or malformed client input.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested transition is not allowed from the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The task transport could not be reached. Non-fatal for submissions.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The backing store failed. Callers should retry the whole operation.
    #[error("Persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl MatchingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

pub type MatchingResult<T> = std::result::Result<T, MatchingError>;
