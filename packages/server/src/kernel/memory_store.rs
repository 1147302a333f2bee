//! In-process store.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suite.
//! All state sits behind one lock and every trait method runs entirely under
//! it, which gives the same atomicity the Postgres store gets from its
//! unique indexes and conditional updates.

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{MatchId, MeetingId, SearchRequestId};
use crate::domains::matching::models::{Match, MatchStatus};
use crate::domains::meetings::models::{AcceptanceOutcome, Meeting, MeetingStatus};
use crate::domains::search::models::{SearchRequest, SearchStatus};
use crate::kernel::{
    BaseMatchRepository, BaseMeetingRepository, BaseSearchRequestRepository, InsertOutcome,
};

#[derive(Default)]
struct MemoryState {
    // Keyed by v7 ids, so iteration order is creation order.
    search_requests: BTreeMap<SearchRequestId, SearchRequest>,
    matches: BTreeMap<MatchId, Match>,
    meetings: BTreeMap<MeetingId, Meeting>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Every stored match, for assertions in tests.
    pub fn all_matches(&self) -> Vec<Match> {
        self.read().matches.values().cloned().collect()
    }

    /// Every stored meeting, for assertions in tests.
    pub fn all_meetings(&self) -> Vec<Meeting> {
        self.read().meetings.values().cloned().collect()
    }

    pub fn search_request_count(&self) -> usize {
        self.read().search_requests.len()
    }
}

#[async_trait]
impl BaseSearchRequestRepository for MemoryStore {
    async fn insert(&self, request: &SearchRequest) -> Result<SearchRequest> {
        self.write()
            .search_requests
            .insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn find_by_id(&self, id: SearchRequestId) -> Result<Option<SearchRequest>> {
        Ok(self.read().search_requests.get(&id).cloned())
    }

    async fn find_live_except(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SearchRequest>> {
        Ok(self
            .read()
            .search_requests
            .values()
            .filter(|r| r.user_id != user_id && r.is_live(now))
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: SearchRequestId) -> Result<()> {
        if let Some(request) = self.write().search_requests.get_mut(&id) {
            request.processed = true;
        }
        Ok(())
    }

    async fn cancel(
        &self,
        id: SearchRequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<SearchRequest>> {
        let mut state = self.write();
        Ok(state.search_requests.get_mut(&id).map(|request| {
            request.status = SearchStatus::Expired;
            request.expires_at = request.expires_at.min(now);
            request.clone()
        }))
    }

    async fn find_unprocessed_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SearchRequest>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .read()
            .search_requests
            .values()
            .filter(|r| !r.processed && r.created_at > since)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for request in self.write().search_requests.values_mut() {
            if request.status == SearchStatus::Active && request.expires_at < now {
                request.status = SearchStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn live_user_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let users: HashSet<String> = self
            .read()
            .search_requests
            .values()
            .filter(|r| r.status == SearchStatus::Active && r.expires_at >= now)
            .map(|r| r.user_id.clone())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.write();
        let before = state.search_requests.len();
        state.search_requests.retain(|_, r| r.created_at >= cutoff);
        Ok((before - state.search_requests.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BaseMatchRepository for MemoryStore {
    async fn insert_if_absent(&self, record: &Match) -> Result<InsertOutcome<Match>> {
        let mut state = self.write();

        let existing = state
            .matches
            .values()
            .find(|m| m.status == MatchStatus::Pending && m.pair_key == record.pair_key)
            .cloned();

        match existing {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => {
                state.matches.insert(record.id, record.clone());
                Ok(InsertOutcome::Created(record.clone()))
            }
        }
    }

    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>> {
        Ok(self.read().matches.get(&id).cloned())
    }

    async fn find_pending_for_user(&self, user_id: &str) -> Result<Vec<Match>> {
        Ok(self
            .read()
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Pending && m.involves(user_id))
            .cloned()
            .collect())
    }

    async fn expire_inactive(&self, active_users: &[String]) -> Result<u64> {
        let active: HashSet<&str> = active_users.iter().map(String::as_str).collect();
        let mut expired = 0;
        for m in self.write().matches.values_mut() {
            let inactive = !active.contains(m.user_id.as_str())
                || !active.contains(m.match_user_id.as_str());
            if m.status == MatchStatus::Pending && inactive {
                m.status = MatchStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn expire_for_expired_searches(&self) -> Result<u64> {
        let mut state = self.write();
        let expired_searches: HashSet<SearchRequestId> = state
            .search_requests
            .values()
            .filter(|r| r.status == SearchStatus::Expired)
            .map(|r| r.id)
            .collect();

        let mut expired = 0;
        for m in state.matches.values_mut() {
            if m.status == MatchStatus::Pending && expired_searches.contains(&m.search_request_id) {
                m.status = MatchStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.write();
        let before = state.matches.len();
        state
            .matches
            .retain(|_, m| m.status == MatchStatus::Pending || m.created_at >= cutoff);
        Ok((before - state.matches.len()) as u64)
    }
}

#[async_trait]
impl BaseMeetingRepository for MemoryStore {
    async fn insert_pending(&self, meeting: &Meeting) -> Result<InsertOutcome<Meeting>> {
        let mut state = self.write();

        let existing = state
            .meetings
            .values()
            .find(|m| {
                m.status == MeetingStatus::Pending
                    && m.match_key == meeting.match_key
                    && m.pair_key == meeting.pair_key
            })
            .cloned();

        match existing {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => {
                state.meetings.insert(meeting.id, meeting.clone());
                Ok(InsertOutcome::Created(meeting.clone()))
            }
        }
    }

    async fn find_by_id(&self, id: MeetingId) -> Result<Option<Meeting>> {
        Ok(self.read().meetings.get(&id).cloned())
    }

    async fn find_pending_proposal(
        &self,
        match_key: &str,
        pair_key: &str,
    ) -> Result<Option<Meeting>> {
        Ok(self
            .read()
            .meetings
            .values()
            .find(|m| {
                m.status == MeetingStatus::Pending
                    && m.match_key == match_key
                    && m.pair_key == pair_key
            })
            .cloned())
    }

    async fn find_confirmed_sibling(
        &self,
        match_key: &str,
        exclude: MeetingId,
    ) -> Result<Option<Meeting>> {
        Ok(self
            .read()
            .meetings
            .values()
            .find(|m| {
                m.match_key == match_key && m.id != exclude && m.status == MeetingStatus::Confirmed
            })
            .cloned())
    }

    async fn transition(
        &self,
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<Option<Meeting>> {
        let mut state = self.write();
        let Some(current) = state.meetings.get(&id).filter(|m| m.status == from).cloned() else {
            return Ok(None);
        };

        // Same rules as the partial unique indexes on `meetings`.
        let collides = state.meetings.values().any(|m| {
            m.id != id
                && m.status == to
                && match to {
                    MeetingStatus::Pending => {
                        m.match_key == current.match_key && m.pair_key == current.pair_key
                    }
                    MeetingStatus::Confirmed => m.match_key == current.match_key,
                    _ => false,
                }
        });
        if collides {
            return Ok(None);
        }

        Ok(state.meetings.get_mut(&id).map(|m| {
            m.status = to;
            m.clone()
        }))
    }

    async fn record_acceptance(
        &self,
        id: MeetingId,
        user_ids: &[String],
    ) -> Result<AcceptanceOutcome> {
        let mut state = self.write();

        let Some(current) = state.meetings.get(&id).cloned() else {
            return Ok(AcceptanceOutcome::Missing);
        };
        if current.status != MeetingStatus::Pending {
            return Ok(AcceptanceOutcome::NotPending(current));
        }

        let mut updated = current.clone();
        for user_id in user_ids {
            if !updated.accepted_by.contains(user_id) {
                updated.accepted_by.push(user_id.clone());
            }
        }

        if updated.is_fully_accepted() {
            let confirmed_sibling = state
                .meetings
                .values()
                .find(|m| {
                    m.match_key == updated.match_key
                        && m.id != id
                        && m.status == MeetingStatus::Confirmed
                })
                .cloned();

            if let Some(confirmed) = confirmed_sibling {
                let mut meeting = current;
                meeting.status = MeetingStatus::Superseded;
                state.meetings.insert(id, meeting.clone());
                return Ok(AcceptanceOutcome::Superseded { meeting, confirmed });
            }

            updated.status = MeetingStatus::Confirmed;
            for sibling in state.meetings.values_mut() {
                if sibling.match_key == updated.match_key
                    && sibling.id != id
                    && sibling.status == MeetingStatus::Pending
                {
                    sibling.status = MeetingStatus::Superseded;
                }
            }
        }

        state.meetings.insert(id, updated.clone());
        Ok(AcceptanceOutcome::Applied(updated))
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.write();
        let before = state.meetings.len();
        state
            .meetings
            .retain(|_, m| !m.status.is_terminal() || m.created_at >= cutoff);
        Ok((before - state.meetings.len()) as u64)
    }
}
