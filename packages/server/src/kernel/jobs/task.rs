use serde::{Deserialize, Serialize};

use crate::common::{Coordinates, SearchRequestId, Venue};
use crate::domains::search::models::SearchRequest;

/// Work item for background matching. Delivered at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTask {
    pub user_id: String,
    pub location: Coordinates,
    #[serde(default)]
    pub venue_filter: Option<Venue>,
    pub search_request_id: SearchRequestId,
    pub proximity_threshold_km: f64,
}

impl SearchTask {
    pub fn from_request(request: &SearchRequest) -> Self {
        Self {
            user_id: request.user_id.clone(),
            location: request.location,
            venue_filter: request.venue().cloned(),
            search_request_id: request.id,
            proximity_threshold_km: request.proximity_threshold_km,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
