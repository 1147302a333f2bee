//! Pairing rules for search requests.
//!
//! Pure functions, no I/O. Persistence and dedup live in `store`.

use tracing::warn;

use crate::common::utils::round_km;
use crate::common::{Coordinates, SearchRequestId, Venue};
use crate::domains::matching::models::Match;
use crate::domains::search::models::SearchRequest;
use crate::kernel::jobs::SearchTask;

/// The side of a pairing that asked for matches.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub user_id: &'a str,
    pub location: Coordinates,
    pub venue_filter: Option<&'a Venue>,
    pub threshold_km: f64,
    pub search_request_id: SearchRequestId,
}

impl<'a> From<&'a SearchRequest> for MatchQuery<'a> {
    fn from(request: &'a SearchRequest) -> Self {
        Self {
            user_id: &request.user_id,
            location: request.location,
            venue_filter: request.venue(),
            threshold_km: request.proximity_threshold_km,
            search_request_id: request.id,
        }
    }
}

impl<'a> From<&'a SearchTask> for MatchQuery<'a> {
    fn from(task: &'a SearchTask) -> Self {
        Self {
            user_id: &task.user_id,
            location: task.location,
            venue_filter: task.venue_filter.as_ref().filter(|v| !v.is_unset()),
            threshold_km: task.proximity_threshold_km,
            search_request_id: task.search_request_id,
        }
    }
}

/// Venue filters are compatible when either side has none, or both name the
/// same venue (exact, case-sensitive).
pub fn venues_compatible(a: Option<&Venue>, b: Option<&Venue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        _ => true,
    }
}

/// Evaluate `query` against every candidate and return one unsaved `Match`
/// per qualifying candidate, in candidate order.
///
/// Distances are compared after rounding to two decimals, so a stored
/// `distance_km` never exceeds the threshold it was accepted under. Only the
/// querying side's threshold applies.
pub fn evaluate(query: MatchQuery<'_>, candidates: &[SearchRequest]) -> Vec<Match> {
    let mut matches = Vec::new();

    for candidate in candidates {
        if candidate.user_id == query.user_id || candidate.id == query.search_request_id {
            continue;
        }

        let distance = match query.location.distance_km_to(&candidate.location) {
            Ok(distance) => round_km(distance),
            Err(e) => {
                warn!(
                    candidate = %candidate.id,
                    error = %e,
                    "skipping candidate with invalid coordinates"
                );
                continue;
            }
        };

        if distance > query.threshold_km {
            continue;
        }

        if !venues_compatible(query.venue_filter, candidate.venue()) {
            continue;
        }

        let venue = candidate.venue().or(query.venue_filter).cloned();

        matches.push(Match::new(
            query.user_id.to_string(),
            candidate.user_id.clone(),
            distance,
            venue,
            query.search_request_id,
        ));
    }

    matches
}
