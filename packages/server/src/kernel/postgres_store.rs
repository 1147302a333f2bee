//! PostgreSQL-backed store.
//!
//! Thin adapter from the repository traits to the model-level queries. Dedup
//! relies on the partial unique indexes created by the migrations, so every
//! operation here is safe under concurrent callers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::common::{MatchId, MeetingId, SearchRequestId};
use crate::domains::matching::models::Match;
use crate::domains::meetings::models::{AcceptanceOutcome, Meeting, MeetingStatus};
use crate::domains::search::models::SearchRequest;
use crate::kernel::{
    BaseMatchRepository, BaseMeetingRepository, BaseSearchRequestRepository, InsertOutcome,
};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseSearchRequestRepository for PostgresStore {
    async fn insert(&self, request: &SearchRequest) -> Result<SearchRequest> {
        request.insert(&self.pool).await
    }

    async fn find_by_id(&self, id: SearchRequestId) -> Result<Option<SearchRequest>> {
        SearchRequest::find_by_id(id, &self.pool).await
    }

    async fn find_live_except(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SearchRequest>> {
        SearchRequest::find_live_except(user_id, now, &self.pool).await
    }

    async fn mark_processed(&self, id: SearchRequestId) -> Result<()> {
        SearchRequest::mark_processed(id, &self.pool).await
    }

    async fn cancel(
        &self,
        id: SearchRequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<SearchRequest>> {
        SearchRequest::cancel(id, now, &self.pool).await
    }

    async fn find_unprocessed_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SearchRequest>> {
        SearchRequest::find_unprocessed_since(since, limit, &self.pool).await
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        SearchRequest::expire_stale(now, &self.pool).await
    }

    async fn live_user_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        SearchRequest::live_user_ids(now, &self.pool).await
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        SearchRequest::delete_created_before(cutoff, &self.pool).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BaseMatchRepository for PostgresStore {
    async fn insert_if_absent(&self, record: &Match) -> Result<InsertOutcome<Match>> {
        if let Some(created) = record.insert_if_absent(&self.pool).await? {
            return Ok(InsertOutcome::Created(created));
        }

        match Match::find_pending_by_pair(&record.pair_key, &self.pool).await? {
            Some(existing) => {
                debug!(pair = %record.pair_key, match_id = %existing.id, "pending match already exists");
                Ok(InsertOutcome::Existing(existing))
            }
            // The conflicting row expired between the insert and the read.
            None => match record.insert_if_absent(&self.pool).await? {
                Some(created) => Ok(InsertOutcome::Created(created)),
                None => {
                    let existing = Match::find_pending_by_pair(&record.pair_key, &self.pool)
                        .await?
                        .ok_or_else(|| {
                            anyhow::anyhow!("pending match for {} vanished", record.pair_key)
                        })?;
                    Ok(InsertOutcome::Existing(existing))
                }
            },
        }
    }

    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>> {
        Match::find_by_id(id, &self.pool).await
    }

    async fn find_pending_for_user(&self, user_id: &str) -> Result<Vec<Match>> {
        Match::find_pending_for_user(user_id, &self.pool).await
    }

    async fn expire_inactive(&self, active_users: &[String]) -> Result<u64> {
        Match::expire_inactive(active_users, &self.pool).await
    }

    async fn expire_for_expired_searches(&self) -> Result<u64> {
        Match::expire_for_expired_searches(&self.pool).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Match::delete_expired_before(cutoff, &self.pool).await
    }
}

#[async_trait]
impl BaseMeetingRepository for PostgresStore {
    async fn insert_pending(&self, meeting: &Meeting) -> Result<InsertOutcome<Meeting>> {
        if let Some(created) = meeting.insert_pending(&self.pool).await? {
            return Ok(InsertOutcome::Created(created));
        }

        match Meeting::find_pending(&meeting.match_key, &meeting.pair_key, &self.pool).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => {
                // The pending proposal left `pending` in between; try once more.
                let created = meeting.insert_pending(&self.pool).await?;
                match created {
                    Some(created) => Ok(InsertOutcome::Created(created)),
                    None => Meeting::find_pending(&meeting.match_key, &meeting.pair_key, &self.pool)
                        .await?
                        .map(InsertOutcome::Existing)
                        .ok_or_else(|| {
                            anyhow::anyhow!("pending meeting for {} vanished", meeting.match_key)
                        }),
                }
            }
        }
    }

    async fn find_by_id(&self, id: MeetingId) -> Result<Option<Meeting>> {
        Meeting::find_by_id(id, &self.pool).await
    }

    async fn find_pending_proposal(
        &self,
        match_key: &str,
        pair_key: &str,
    ) -> Result<Option<Meeting>> {
        Meeting::find_pending(match_key, pair_key, &self.pool).await
    }

    async fn find_confirmed_sibling(
        &self,
        match_key: &str,
        exclude: MeetingId,
    ) -> Result<Option<Meeting>> {
        Meeting::find_confirmed_sibling(match_key, exclude, &self.pool).await
    }

    async fn transition(
        &self,
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<Option<Meeting>> {
        Meeting::transition(id, from, to, &self.pool).await
    }

    async fn record_acceptance(
        &self,
        id: MeetingId,
        user_ids: &[String],
    ) -> Result<AcceptanceOutcome> {
        Meeting::record_acceptance(id, user_ids, &self.pool).await
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Meeting::delete_terminal_before(cutoff, &self.pool).await
    }
}
