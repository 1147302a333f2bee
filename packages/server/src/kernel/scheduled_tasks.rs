//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler
//!     │
//!     ├─► every sweep interval (2s)  ─► ExpirySweeper::sweep_once
//!     │       ├─► expire stale search requests
//!     │       ├─► collect live user ids
//!     │       └─► expire pending matches with an inactive participant
//!     │
//!     └─► every minute               ─► RetentionPurge::purge_once
//! ```
//!
//! Meetings are never expired here; the coordinator expires them on read.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::kernel::{BaseMatchRepository, BaseMeetingRepository, BaseSearchRequestRepository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired_searches: u64,
    pub expired_matches: u64,
}

pub struct ExpirySweeper {
    searches: Arc<dyn BaseSearchRequestRepository>,
    matches: Arc<dyn BaseMatchRepository>,
}

impl ExpirySweeper {
    pub fn new(
        searches: Arc<dyn BaseSearchRequestRepository>,
        matches: Arc<dyn BaseMatchRepository>,
    ) -> Self {
        Self { searches, matches }
    }

    /// One sweep tick. Also backs `POST /admin/sweep`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired_searches = self.searches.expire_stale(now).await?;

        // An empty active set expires every pending match.
        let active_users = self.searches.live_user_ids(now).await?;
        let inactive = self.matches.expire_inactive(&active_users).await?;
        let orphaned = self.matches.expire_for_expired_searches().await?;

        let report = SweepReport {
            expired_searches,
            expired_matches: inactive + orphaned,
        };

        if report != SweepReport::default() {
            debug!(
                expired_searches = report.expired_searches,
                expired_matches = report.expired_matches,
                active_users = active_users.len(),
                "sweep complete"
            );
        }

        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub search_requests: u64,
    pub matches: u64,
    pub meetings: u64,
}

/// Deletes records older than the retention window. Pending matches and
/// meetings are kept regardless of age.
pub struct RetentionPurge {
    searches: Arc<dyn BaseSearchRequestRepository>,
    matches: Arc<dyn BaseMatchRepository>,
    meetings: Arc<dyn BaseMeetingRepository>,
    retention: chrono::Duration,
}

impl RetentionPurge {
    pub fn new(
        searches: Arc<dyn BaseSearchRequestRepository>,
        matches: Arc<dyn BaseMatchRepository>,
        meetings: Arc<dyn BaseMeetingRepository>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            searches,
            matches,
            meetings,
            retention,
        }
    }

    pub async fn purge_once(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = now - self.retention;

        let report = PurgeReport {
            search_requests: self.searches.delete_created_before(cutoff).await?,
            matches: self.matches.delete_expired_before(cutoff).await?,
            meetings: self.meetings.delete_terminal_before(cutoff).await?,
        };

        if report != PurgeReport::default() {
            info!(
                search_requests = report.search_requests,
                matches = report.matches,
                meetings = report.meetings,
                "retention purge complete"
            );
        }

        Ok(report)
    }
}

/// Start the sweeper and the retention purge.
///
/// The returned scheduler must be shut down on exit.
pub async fn start_scheduler(
    sweeper: Arc<ExpirySweeper>,
    purge: Arc<RetentionPurge>,
    sweep_interval: Duration,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_job = Job::new_repeated_async(sweep_interval, move |_uuid, _lock| {
        let sweeper = sweeper.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.sweep_once(Utc::now()).await {
                error!(error = %e, "Expiry sweep failed");
            }
        })
    })?;

    scheduler.add(sweep_job).await?;

    let purge_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let purge = purge.clone();
        Box::pin(async move {
            if let Err(e) = purge.purge_once(Utc::now()).await {
                error!(error = %e, "Retention purge failed");
            }
        })
    })?;

    scheduler.add(purge_job).await?;
    scheduler.start().await?;

    info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "Scheduled tasks started (expiry sweep, retention purge every minute)"
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Coordinates, SearchRequestId};
    use crate::domains::matching::models::{Match, MatchStatus};
    use crate::domains::meetings::models::{Meeting, MeetingStatus};
    use crate::domains::search::models::{SearchRequest, SearchStatus};
    use crate::kernel::MemoryStore;

    fn search(user: &str, now: DateTime<Utc>, ttl_secs: i64) -> SearchRequest {
        SearchRequest::new(
            user.to_string(),
            Coordinates::new(1.3, 103.8),
            None,
            2.0,
            chrono::Duration::seconds(ttl_secs),
            now,
        )
    }

    fn sweeper(store: &Arc<MemoryStore>) -> ExpirySweeper {
        ExpirySweeper::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_sweep_expires_match_when_one_side_goes_stale() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let ann = search("ann", now, 20);
        let bob = search("bob", now, 1);
        store.insert(&ann).await.unwrap();
        store.insert(&bob).await.unwrap();
        let record = Match::new("ann".into(), "bob".into(), 0.1, None, ann.id);
        store.insert_if_absent(&record).await.unwrap();

        let report = sweeper(&store)
            .sweep_once(now + chrono::Duration::seconds(2))
            .await
            .unwrap();

        assert_eq!(report.expired_searches, 1);
        assert_eq!(report.expired_matches, 1);
        assert_eq!(store.all_matches()[0].status, MatchStatus::Expired);
        let bob = BaseSearchRequestRepository::find_by_id(store.as_ref(), bob.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.status, SearchStatus::Expired);
    }

    #[tokio::test]
    async fn test_sweep_keeps_match_while_both_sides_live() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let ann = search("ann", now, 20);
        store.insert(&ann).await.unwrap();
        store.insert(&search("bob", now, 20)).await.unwrap();
        store
            .insert_if_absent(&Match::new("ann".into(), "bob".into(), 0.1, None, ann.id))
            .await
            .unwrap();

        let report = sweeper(&store).sweep_once(now).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.all_matches()[0].status, MatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_with_no_active_users_expires_everything_pending() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_if_absent(&Match::new(
                "ann".into(),
                "bob".into(),
                0.1,
                None,
                SearchRequestId::new(),
            ))
            .await
            .unwrap();

        let report = sweeper(&store).sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.expired_matches, 1);
    }

    #[tokio::test]
    async fn test_sweep_expires_match_of_cancelled_search_even_if_user_has_another() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let cancelled = search("ann", now, 20);
        store.insert(&cancelled).await.unwrap();
        store.insert(&search("ann", now, 20)).await.unwrap();
        store.insert(&search("bob", now, 20)).await.unwrap();
        store
            .insert_if_absent(&Match::new("ann".into(), "bob".into(), 0.1, None, cancelled.id))
            .await
            .unwrap();
        store.cancel(cancelled.id, now).await.unwrap();

        let report = sweeper(&store).sweep_once(now).await.unwrap();
        assert_eq!(report.expired_matches, 1);
    }

    #[tokio::test]
    async fn test_purge_removes_old_records_but_keeps_pending_meetings() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let old = now - chrono::Duration::hours(2);
        store.insert(&search("ann", old, 20)).await.unwrap();
        store.insert(&search("bob", now, 20)).await.unwrap();

        let pending = Meeting::new(
            "m1".into(),
            "ann".into(),
            "bob".into(),
            serde_json::json!({}),
            true,
            chrono::Duration::seconds(30),
            old,
        );
        let mut expired = pending.clone();
        expired.id = crate::common::MeetingId::new();
        expired.match_key = "m2".into();
        expired.status = MeetingStatus::Expired;
        store.insert_pending(&pending).await.unwrap();
        store.insert_pending(&expired).await.unwrap();

        let purge = RetentionPurge::new(
            store.clone(),
            store.clone(),
            store.clone(),
            chrono::Duration::hours(1),
        );
        let report = purge.purge_once(now).await.unwrap();

        assert_eq!(report.search_requests, 1);
        assert_eq!(report.meetings, 1);
        assert_eq!(store.search_request_count(), 1);
        assert_eq!(store.all_meetings().len(), 1);
        assert_eq!(store.all_meetings()[0].id, pending.id);
    }
}
