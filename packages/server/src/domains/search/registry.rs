use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::common::{Coordinates, MatchingError, MatchingResult, SearchRequestId, Venue};
use crate::config::MatchingSettings;
use crate::domains::search::models::SearchRequest;
use crate::kernel::BaseSearchRequestRepository;

/// Input for a new search.
#[derive(Debug, Clone)]
pub struct SearchSubmission {
    pub user_id: String,
    pub location: Coordinates,
    pub venue_filter: Option<Venue>,
    /// `None` falls back to the configured default.
    pub proximity_threshold_km: Option<f64>,
}

/// Creates, reads and cancels search requests.
pub struct SearchRegistry {
    repo: Arc<dyn BaseSearchRequestRepository>,
    settings: MatchingSettings,
}

impl SearchRegistry {
    pub fn new(repo: Arc<dyn BaseSearchRequestRepository>, settings: MatchingSettings) -> Self {
        Self { repo, settings }
    }

    /// Always creates a new record; a user may hold several live requests.
    #[instrument(skip(self, submission), fields(user_id = %submission.user_id))]
    pub async fn submit(
        &self,
        submission: SearchSubmission,
        now: DateTime<Utc>,
    ) -> MatchingResult<SearchRequest> {
        let user_id = submission.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(MatchingError::validation("userId is required"));
        }

        let location = submission
            .location
            .validated()
            .map_err(|e| MatchingError::validation(e.to_string()))?;

        let threshold = submission
            .proximity_threshold_km
            .unwrap_or(self.settings.default_proximity_km);
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MatchingError::validation(
                "proximityThresholdKm must be a positive number",
            ));
        }

        let request = SearchRequest::new(
            user_id,
            location,
            submission.venue_filter,
            threshold,
            self.settings.search_ttl(),
            now,
        );
        let request = self.repo.insert(&request).await?;

        info!(
            search_request_id = %request.id,
            expires_at = %request.expires_at,
            threshold_km = request.proximity_threshold_km,
            "search request created"
        );

        Ok(request)
    }

    pub async fn get(&self, id: SearchRequestId) -> MatchingResult<SearchRequest> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| MatchingError::not_found("SearchRequest", id))
    }

    /// Live requests from everyone but `excluding_user_id`.
    pub async fn active_others(
        &self,
        excluding_user_id: &str,
        now: DateTime<Utc>,
    ) -> MatchingResult<Vec<SearchRequest>> {
        Ok(self.repo.find_live_except(excluding_user_id, now).await?)
    }

    pub async fn mark_processed(&self, id: SearchRequestId) -> MatchingResult<()> {
        Ok(self.repo.mark_processed(id).await?)
    }

    /// Immediate expiry. When `user_id` is given it must own the request.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: SearchRequestId,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> MatchingResult<SearchRequest> {
        let request = self.get(id).await?;
        if let Some(user_id) = user_id {
            if request.user_id != user_id.trim() {
                return Err(MatchingError::validation(
                    "search request belongs to another user",
                ));
            }
        }

        let cancelled = self
            .repo
            .cancel(id, now)
            .await?
            .ok_or_else(|| MatchingError::not_found("SearchRequest", id))?;

        info!(search_request_id = %id, "search request cancelled");
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::search::models::SearchStatus;
    use crate::kernel::MemoryStore;

    fn registry() -> (Arc<MemoryStore>, SearchRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = SearchRegistry::new(store.clone(), MatchingSettings::default());
        (store, registry)
    }

    fn submission(user: &str) -> SearchSubmission {
        SearchSubmission {
            user_id: user.to_string(),
            location: Coordinates::new(1.3, 103.8),
            venue_filter: None,
            proximity_threshold_km: None,
        }
    }

    #[tokio::test]
    async fn test_submit_applies_default_threshold_and_ttl() {
        let (_, registry) = registry();
        let now = Utc::now();
        let request = registry.submit(submission("ann"), now).await.unwrap();

        assert_eq!(request.proximity_threshold_km, 2.0);
        assert_eq!(request.expires_at, now + chrono::Duration::seconds(20));
        assert_eq!(request.status, SearchStatus::Active);
    }

    #[tokio::test]
    async fn test_submit_never_dedupes_by_user() {
        let (store, registry) = registry();
        let now = Utc::now();
        let first = registry.submit(submission("ann"), now).await.unwrap();
        let second = registry.submit(submission("ann"), now).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.search_request_count(), 2);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input() {
        let (_, registry) = registry();
        let now = Utc::now();

        let blank = registry.submit(submission("  "), now).await;
        assert!(matches!(blank, Err(MatchingError::Validation(_))));

        let mut off_map = submission("ann");
        off_map.location = Coordinates::new(91.0, 0.0);
        assert!(matches!(
            registry.submit(off_map, now).await,
            Err(MatchingError::Validation(_))
        ));

        let mut negative = submission("ann");
        negative.proximity_threshold_km = Some(-1.0);
        assert!(matches!(
            registry.submit(negative, now).await,
            Err(MatchingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_active_others_excludes_self_and_expired() {
        let (_, registry) = registry();
        let now = Utc::now();
        registry.submit(submission("ann"), now).await.unwrap();
        registry.submit(submission("bob"), now).await.unwrap();
        registry
            .submit(submission("cat"), now - chrono::Duration::seconds(30))
            .await
            .unwrap();

        let others = registry.active_others("ann", now).await.unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].user_id, "bob");
    }

    #[tokio::test]
    async fn test_cancel_expires_immediately() {
        let (_, registry) = registry();
        let now = Utc::now();
        let request = registry.submit(submission("ann"), now).await.unwrap();

        let cancelled = registry.cancel(request.id, Some("ann"), now).await.unwrap();
        assert_eq!(cancelled.status, SearchStatus::Expired);
        assert_eq!(cancelled.expires_at, now);
        assert!(registry.active_others("bob", now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_checks_owner_and_existence() {
        let (_, registry) = registry();
        let now = Utc::now();
        let request = registry.submit(submission("ann"), now).await.unwrap();

        assert!(matches!(
            registry.cancel(request.id, Some("bob"), now).await,
            Err(MatchingError::Validation(_))
        ));
        assert!(matches!(
            registry.cancel(SearchRequestId::new(), None, now).await,
            Err(MatchingError::NotFound { .. })
        ));
    }
}
