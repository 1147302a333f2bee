//! Meeting lifecycle: `pending` moves to exactly one of `confirmed`,
//! `expired` or `superseded`, and never leaves a terminal state except through
//! a forced confirmation of an expired proposal.
//!
//! All writes are compare-and-swap operations on the store, so concurrent
//! callers converge on one outcome without in-process locks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::common::{MatchingError, MatchingResult, MeetingId};
use crate::config::MatchingSettings;
use crate::domains::meetings::models::{AcceptanceOutcome, Meeting, MeetingStatus, MeetingView};
use crate::kernel::{BaseMeetingRepository, InsertOutcome};

/// Input for `create_or_join`.
#[derive(Debug, Clone)]
pub struct MeetingProposal {
    pub match_key: String,
    pub proposer_id: String,
    pub other_id: String,
    pub details: serde_json::Value,
    pub auto_accept: bool,
    /// `None` uses the configured decision timeout.
    pub decision_timeout: Option<Duration>,
}

pub struct MeetingCoordinator {
    repo: Arc<dyn BaseMeetingRepository>,
    settings: MatchingSettings,
}

impl MeetingCoordinator {
    pub fn new(repo: Arc<dyn BaseMeetingRepository>, settings: MatchingSettings) -> Self {
        Self { repo, settings }
    }

    /// Create a pending proposal, or join the pending proposal that already
    /// exists for the same match key between the same two users. Joining adds
    /// the proposer to `accepted_by`, which confirms the meeting when the
    /// other side proposed first.
    #[instrument(skip(self, proposal), fields(match_key = %proposal.match_key))]
    pub async fn create_or_join(
        &self,
        proposal: MeetingProposal,
        now: DateTime<Utc>,
    ) -> MatchingResult<Meeting> {
        let match_key = proposal.match_key.trim();
        let proposer = proposal.proposer_id.trim();
        let other = proposal.other_id.trim();
        if match_key.is_empty() || proposer.is_empty() || other.is_empty() {
            return Err(MatchingError::validation(
                "matchKey, proposerId and otherId are required",
            ));
        }
        if proposer == other {
            return Err(MatchingError::validation("cannot propose a meeting with yourself"));
        }

        let timeout = proposal
            .decision_timeout
            .unwrap_or_else(|| self.settings.decision_timeout());
        if timeout <= Duration::zero() {
            return Err(MatchingError::validation("decision timeout must be positive"));
        }
        if now.checked_add_signed(timeout).is_none() {
            return Err(MatchingError::validation("decision timeout is out of range"));
        }

        let candidate = Meeting::new(
            match_key.to_string(),
            proposer.to_string(),
            other.to_string(),
            proposal.details,
            proposal.auto_accept,
            timeout,
            now,
        );

        // A stale pending proposal blocks the slot until someone expires it;
        // do that here and retry once.
        for _ in 0..2 {
            match self.repo.insert_pending(&candidate).await? {
                InsertOutcome::Created(meeting) => {
                    info!(meeting_id = %meeting.id, "meeting proposed");
                    return Ok(meeting);
                }
                InsertOutcome::Existing(existing) if existing.is_past_deadline(now) => {
                    self.repo
                        .transition(existing.id, MeetingStatus::Pending, MeetingStatus::Expired)
                        .await?;
                    debug!(meeting_id = %existing.id, "expired stale proposal before re-proposing");
                }
                InsertOutcome::Existing(existing) => {
                    debug!(meeting_id = %existing.id, "joining pending proposal");
                    let outcome = self
                        .repo
                        .record_acceptance(existing.id, &[proposer.to_string()])
                        .await?;
                    return self.settle_join(existing.id, outcome);
                }
            }
        }

        Err(MatchingError::conflict(
            "a pending proposal for this match could not be replaced",
        ))
    }

    fn settle_join(&self, id: MeetingId, outcome: AcceptanceOutcome) -> MatchingResult<Meeting> {
        match outcome {
            AcceptanceOutcome::Applied(meeting) => {
                if meeting.status == MeetingStatus::Confirmed {
                    info!(meeting_id = %meeting.id, "meeting confirmed on join");
                }
                Ok(meeting)
            }
            AcceptanceOutcome::NotPending(meeting) => Ok(meeting),
            AcceptanceOutcome::Superseded { confirmed, .. } => Ok(confirmed),
            AcceptanceOutcome::Missing => Err(MatchingError::not_found("Meeting", id)),
        }
    }

    /// Record `user_id`'s acceptance.
    ///
    /// Confirmed meetings are returned unchanged. `force` accepts for both
    /// participants and also revives an expired proposal.
    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        id: MeetingId,
        user_id: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> MatchingResult<Meeting> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(MatchingError::validation("userId is required"));
        }

        let meeting = self.load(id).await?;
        if !meeting.is_participant(user_id) {
            return Err(MatchingError::conflict(format!(
                "{} is not a participant of meeting {}",
                user_id, id
            )));
        }

        let mut target = id;
        match meeting.status {
            MeetingStatus::Confirmed => return Ok(meeting),
            MeetingStatus::Superseded => {
                return Err(MatchingError::conflict(
                    "another proposal for this match was confirmed",
                ))
            }
            MeetingStatus::Expired if !force => {
                return Err(MatchingError::conflict("meeting has expired"));
            }
            MeetingStatus::Expired => {
                warn!(meeting_id = %id, "forcing confirmation of an expired meeting");
                target = self.reopen_for_force(&meeting).await?;
            }
            MeetingStatus::Pending if !force && meeting.is_past_deadline(now) => {
                self.repo
                    .transition(id, MeetingStatus::Pending, MeetingStatus::Expired)
                    .await?;
                info!(meeting_id = %id, "meeting expired before acceptance");
                return Err(MatchingError::conflict("meeting has expired"));
            }
            MeetingStatus::Pending => {}
        }

        let accepting = if force {
            vec![meeting.user1_id.clone(), meeting.user2_id.clone()]
        } else {
            vec![user_id.to_string()]
        };

        match self.repo.record_acceptance(target, &accepting).await? {
            AcceptanceOutcome::Applied(updated) => {
                if updated.status == MeetingStatus::Confirmed {
                    info!(meeting_id = %target, match_key = %updated.match_key, "meeting confirmed");
                }
                Ok(updated)
            }
            AcceptanceOutcome::NotPending(current) if current.status == MeetingStatus::Confirmed => {
                Ok(current)
            }
            AcceptanceOutcome::NotPending(current) => Err(MatchingError::conflict(format!(
                "meeting is no longer pending ({:?})",
                current.status
            ))),
            AcceptanceOutcome::Superseded { confirmed, .. } => Err(MatchingError::conflict(
                format!("meeting {} was confirmed for this match first", confirmed.id),
            )),
            AcceptanceOutcome::Missing => Err(MatchingError::not_found("Meeting", target)),
        }
    }

    /// The pending proposal a forced confirmation of the expired `meeting`
    /// lands on. A re-proposal between the same two users holds the pending
    /// slot and is used as is; otherwise the expired proposal is reopened.
    async fn reopen_for_force(&self, meeting: &Meeting) -> MatchingResult<MeetingId> {
        for _ in 0..2 {
            if let Some(holder) = self
                .repo
                .find_pending_proposal(&meeting.match_key, &meeting.pair_key)
                .await?
            {
                debug!(meeting_id = %meeting.id, holder_id = %holder.id, "forcing onto pending re-proposal");
                return Ok(holder.id);
            }

            if self
                .repo
                .transition(meeting.id, MeetingStatus::Expired, MeetingStatus::Pending)
                .await?
                .is_some()
            {
                return Ok(meeting.id);
            }
        }

        Err(MatchingError::conflict(
            "meeting changed while forcing confirmation",
        ))
    }

    pub async fn status(&self, id: MeetingId, user_id: Option<&str>) -> MatchingResult<MeetingView> {
        self.status_at(id, user_id, Utc::now()).await
    }

    /// Current view of a meeting, settling whatever is already decided:
    /// a confirmed sibling supersedes this proposal (and its view is returned
    /// instead), a fully accepted proposal is confirmed, and a proposal past
    /// its deadline expires.
    #[instrument(skip(self))]
    pub async fn status_at(
        &self,
        id: MeetingId,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> MatchingResult<MeetingView> {
        let meeting = self.load(id).await?;
        if let Some(user_id) = user_id.map(str::trim).filter(|u| !u.is_empty()) {
            if !meeting.is_participant(user_id) {
                return Err(MatchingError::validation(format!(
                    "{} is not a participant of meeting {}",
                    user_id, id
                )));
            }
        }

        if meeting.status != MeetingStatus::Pending {
            return Ok(meeting.view(now));
        }

        if let Some(confirmed) = self.repo.find_confirmed_sibling(&meeting.match_key, id).await? {
            self.repo
                .transition(id, MeetingStatus::Pending, MeetingStatus::Superseded)
                .await?;
            debug!(meeting_id = %id, confirmed_id = %confirmed.id, "superseded on read");
            return Ok(confirmed.view(now));
        }

        if meeting.is_fully_accepted() {
            warn!(meeting_id = %id, "fully accepted meeting still pending, confirming");
            let settled = match self.repo.record_acceptance(id, &[]).await? {
                AcceptanceOutcome::Applied(m) | AcceptanceOutcome::NotPending(m) => m,
                AcceptanceOutcome::Superseded { confirmed, .. } => confirmed,
                AcceptanceOutcome::Missing => return Err(MatchingError::not_found("Meeting", id)),
            };
            return Ok(settled.view(now));
        }

        if meeting.is_past_deadline(now) {
            let expired = match self
                .repo
                .transition(id, MeetingStatus::Pending, MeetingStatus::Expired)
                .await?
            {
                Some(m) => m,
                None => self.load(id).await?,
            };
            debug!(meeting_id = %id, status = ?expired.status, "expired on read");
            return Ok(expired.view(now));
        }

        Ok(meeting.view(now))
    }

    async fn load(&self, id: MeetingId) -> MatchingResult<Meeting> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| MatchingError::not_found("Meeting", id))
    }
}
