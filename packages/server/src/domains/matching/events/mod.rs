use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{MatchId, Venue};
use crate::domains::matching::models::Match;

/// Subject every match-found event is published to.
pub const MATCHES_FOUND_SUBJECT: &str = "matches.found";

/// Per-user subject, so a client only subscribes to its own matches.
pub fn user_matches_subject(user_id: &str) -> String {
    format!("users.{}.matches", user_id)
}

/// Emitted once per newly created match. Never re-emitted for an existing pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundEvent {
    pub user_id: String,
    pub match_user_id: String,
    pub match_id: MatchId,
    pub distance_km: f64,
    pub venue: Option<Venue>,
    pub timestamp: DateTime<Utc>,
}

impl MatchFoundEvent {
    pub fn from_match(record: &Match) -> Self {
        Self {
            user_id: record.user_id.clone(),
            match_user_id: record.match_user_id.clone(),
            match_id: record.id,
            distance_km: record.distance_km,
            venue: record.venue.as_ref().map(|v| v.0.clone()),
            timestamp: Utc::now(),
        }
    }

    /// All subjects this event fans out to.
    pub fn subjects(&self) -> Vec<String> {
        vec![
            MATCHES_FOUND_SUBJECT.to_string(),
            user_matches_subject(&self.user_id),
            user_matches_subject(&self.match_user_id),
        ]
    }
}
