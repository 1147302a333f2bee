// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Matching rules and the meeting state machine live in the domains and use
// these traits.
//
// Naming convention: Base* for trait names (e.g., BaseNotifier, BaseMatchRepository)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{MatchId, MeetingId, SearchRequestId};
use crate::domains::matching::events::MatchFoundEvent;
use crate::domains::matching::models::Match;
use crate::domains::meetings::models::{AcceptanceOutcome, Meeting, MeetingStatus};
use crate::domains::search::models::SearchRequest;

/// Result of an idempotent insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome<T> {
    /// The record was written.
    Created(T),
    /// An equivalent record already existed; it is returned instead.
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Created(v) | InsertOutcome::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

// =============================================================================
// Store traits (Infrastructure - shared mutable state)
// =============================================================================

#[async_trait]
pub trait BaseSearchRequestRepository: Send + Sync {
    async fn insert(&self, request: &SearchRequest) -> Result<SearchRequest>;

    async fn find_by_id(&self, id: SearchRequestId) -> Result<Option<SearchRequest>>;

    /// Active requests with `expires_at > now`, excluding `user_id`.
    async fn find_live_except(&self, user_id: &str, now: DateTime<Utc>)
        -> Result<Vec<SearchRequest>>;

    /// Idempotent.
    async fn mark_processed(&self, id: SearchRequestId) -> Result<()>;

    /// Expire immediately. Returns `None` for unknown ids.
    async fn cancel(&self, id: SearchRequestId, now: DateTime<Utc>)
        -> Result<Option<SearchRequest>>;

    async fn find_unprocessed_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SearchRequest>>;

    /// Active requests with `expires_at < now` become expired. Returns the count.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Users holding at least one live request.
    async fn live_user_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait BaseMatchRepository: Send + Sync {
    /// Atomically insert unless a pending match covers the same pair.
    async fn insert_if_absent(&self, record: &Match) -> Result<InsertOutcome<Match>>;

    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>>;

    async fn find_pending_for_user(&self, user_id: &str) -> Result<Vec<Match>>;

    /// Pending matches with a participant outside `active_users` expire.
    async fn expire_inactive(&self, active_users: &[String]) -> Result<u64>;

    /// Pending matches whose originating search expired.
    async fn expire_for_expired_searches(&self) -> Result<u64>;

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait BaseMeetingRepository: Send + Sync {
    /// Insert a new pending proposal, or return the pending proposal that
    /// already exists for the same match key and pair.
    async fn insert_pending(&self, meeting: &Meeting) -> Result<InsertOutcome<Meeting>>;

    async fn find_by_id(&self, id: MeetingId) -> Result<Option<Meeting>>;

    /// The pending proposal holding the slot for `match_key` and `pair_key`.
    async fn find_pending_proposal(
        &self,
        match_key: &str,
        pair_key: &str,
    ) -> Result<Option<Meeting>>;

    async fn find_confirmed_sibling(
        &self,
        match_key: &str,
        exclude: MeetingId,
    ) -> Result<Option<Meeting>>;

    /// Compare-and-swap on status. `None` if the meeting was not in `from`,
    /// or if the move would give its pair a second pending proposal or its
    /// match key a second confirmed meeting.
    async fn transition(
        &self,
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<Option<Meeting>>;

    /// Atomically add acceptances to a pending meeting, confirming it and
    /// superseding its pending siblings once both participants accepted.
    async fn record_acceptance(
        &self,
        id: MeetingId,
        user_ids: &[String],
    ) -> Result<AcceptanceOutcome>;

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// Collaborator traits (Infrastructure - best effort)
// =============================================================================

/// Fan-out of match-found events to live clients.
#[async_trait]
pub trait BaseNotifier: Send + Sync {
    async fn publish(&self, event: &MatchFoundEvent) -> Result<()>;
}

/// Display data for a user, used only to enrich responses.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccountProfile {
    pub name: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[async_trait]
pub trait BaseAccountDirectory: Send + Sync {
    /// `Ok(None)` when the account is unknown.
    async fn resolve(&self, user_id: &str) -> Result<Option<AccountProfile>>;
}

#[async_trait]
pub trait BaseVenueCatalog: Send + Sync {
    /// Look a venue up by name or id. `Ok(None)` when the catalog has no entry.
    async fn resolve(&self, name_or_id: &str) -> Result<Option<serde_json::Value>>;
}
