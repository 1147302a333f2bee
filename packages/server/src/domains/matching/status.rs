//! Read side of a search: progress plus the caller's matches, enriched for
//! display.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::common::{MatchingResult, SearchRequestId};
use crate::domains::matching::models::MatchView;
use crate::domains::search::models::{SearchRequest, SearchStatus};
use crate::domains::search::registry::SearchRegistry;
use crate::kernel::{BaseAccountDirectory, BaseMatchRepository, BaseVenueCatalog};

pub const UNKNOWN_USER: &str = "Unknown User";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProgress {
    /// Live, background matching not yet run.
    Processing,
    /// Live, background matching ran at least once.
    Completed,
    Expired,
}

impl SearchProgress {
    pub fn of(request: &SearchRequest, now: DateTime<Utc>) -> Self {
        if request.status == SearchStatus::Expired || !request.is_live(now) {
            SearchProgress::Expired
        } else if request.processed {
            SearchProgress::Completed
        } else {
            SearchProgress::Processing
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatusReport {
    pub search_request_id: SearchRequestId,
    pub status: SearchProgress,
    pub matches: Vec<MatchView>,
    pub proximity_threshold_km: f64,
    pub expires_at: DateTime<Utc>,
}

pub struct SearchStatusReader {
    registry: Arc<SearchRegistry>,
    matches: Arc<dyn BaseMatchRepository>,
    accounts: Arc<dyn BaseAccountDirectory>,
    venues: Arc<dyn BaseVenueCatalog>,
    timeout: Duration,
}

impl SearchStatusReader {
    pub fn new(
        registry: Arc<SearchRegistry>,
        matches: Arc<dyn BaseMatchRepository>,
        accounts: Arc<dyn BaseAccountDirectory>,
        venues: Arc<dyn BaseVenueCatalog>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            matches,
            accounts,
            venues,
            timeout,
        }
    }

    /// Pending matches are reported from `viewer`'s perspective, which
    /// defaults to the request's owner. One entry per counterpart.
    #[instrument(skip(self))]
    pub async fn status(
        &self,
        id: SearchRequestId,
        viewer: Option<&str>,
        now: DateTime<Utc>,
    ) -> MatchingResult<SearchStatusReport> {
        let request = self.registry.get(id).await?;
        let viewer = viewer
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(request.user_id.as_str());

        let mut views: Vec<MatchView> = Vec::new();
        for record in self.matches.find_pending_for_user(viewer).await? {
            let Some(view) = record.view_for(viewer) else {
                continue;
            };
            if views.iter().any(|v| v.match_user_id == view.match_user_id) {
                continue;
            }
            views.push(view);
        }

        self.enrich(&mut views).await;

        Ok(SearchStatusReport {
            search_request_id: request.id,
            status: SearchProgress::of(&request, now),
            matches: views,
            proximity_threshold_km: request.proximity_threshold_km,
            expires_at: request.expires_at,
        })
    }

    async fn enrich(&self, views: &mut [MatchView]) {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut venues: HashMap<String, Option<serde_json::Value>> = HashMap::new();

        for view in views.iter_mut() {
            if !names.contains_key(&view.match_user_id) {
                let name = self
                    .bounded("account directory", self.accounts.resolve(&view.match_user_id))
                    .await
                    .flatten()
                    .and_then(|profile| profile.name)
                    .unwrap_or_else(|| UNKNOWN_USER.to_string());
                names.insert(view.match_user_id.clone(), name);
            }
            view.match_name = names.get(&view.match_user_id).cloned();

            let Some(key) = view
                .venue
                .as_ref()
                .and_then(|v| v.lookup_key())
                .map(str::to_string)
            else {
                continue;
            };
            if !venues.contains_key(&key) {
                let details = self
                    .bounded("venue catalog", self.venues.resolve(&key))
                    .await
                    .flatten();
                venues.insert(key.clone(), details);
            }
            view.venue_details = venues.get(&key).cloned().flatten();
        }
    }

    /// Enrichment is optional: errors and timeouts become `None`.
    async fn bounded<T>(
        &self,
        collaborator: &'static str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(collaborator, error = %e, "enrichment lookup failed");
                None
            }
            Err(_) => {
                warn!(collaborator, "enrichment lookup timed out");
                None
            }
        }
    }
}
