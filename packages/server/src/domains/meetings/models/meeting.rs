use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use crate::common::{pair_key, MeetingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meeting_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Pending,
    Confirmed,
    Expired,
    Superseded,
}

impl MeetingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MeetingStatus::Pending)
    }
}

/// A two-party proposal to meet, keyed by the match it came from.
///
/// `status == Confirmed` iff `accepted_by` holds both participants. Several
/// proposals may share a `match_key`; at most one of them is ever confirmed.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Meeting {
    pub id: MeetingId,
    pub user1_id: String,
    pub user2_id: String,
    pub pair_key: String,
    pub match_key: String,
    pub details: Json<serde_json::Value>,
    pub status: MeetingStatus,
    pub accepted_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of an attempt to add acceptances to a meeting.
#[derive(Debug, Clone)]
pub enum AcceptanceOutcome {
    /// Applied to a pending meeting; it may now be confirmed.
    Applied(Meeting),
    /// The meeting had already left `pending`; returned unchanged.
    NotPending(Meeting),
    /// A sibling with the same match key was confirmed first.
    Superseded { meeting: Meeting, confirmed: Meeting },
    Missing,
}

/// Client-facing meeting representation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingView {
    pub id: MeetingId,
    pub user1_id: String,
    pub user2_id: String,
    pub match_key: String,
    pub details: serde_json::Value,
    pub status: MeetingStatus,
    pub accepted_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub is_fully_accepted: bool,
}

impl Meeting {
    pub fn new(
        match_key: String,
        proposer_id: String,
        other_id: String,
        details: serde_json::Value,
        auto_accept: bool,
        decision_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let accepted_by = if auto_accept {
            vec![proposer_id.clone()]
        } else {
            Vec::new()
        };

        Self {
            id: MeetingId::new(),
            pair_key: pair_key(&proposer_id, &other_id),
            user1_id: proposer_id,
            user2_id: other_id,
            match_key,
            details: Json(details),
            status: MeetingStatus::Pending,
            accepted_by,
            created_at: now,
            expires_at: now + decision_timeout,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.accepted_by.contains(&self.user1_id) && self.accepted_by.contains(&self.user2_id)
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.status != MeetingStatus::Pending {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn view(&self, now: DateTime<Utc>) -> MeetingView {
        MeetingView {
            id: self.id,
            user1_id: self.user1_id.clone(),
            user2_id: self.user2_id.clone(),
            match_key: self.match_key.clone(),
            details: self.details.0.clone(),
            status: self.status,
            accepted_by: self.accepted_by.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            remaining_seconds: self.remaining_seconds(now),
            is_fully_accepted: self.is_fully_accepted(),
        }
    }

    /// Insert as a new pending proposal.
    ///
    /// Returns `None` if a pending proposal for the same match key and pair
    /// already exists (partial unique index).
    pub async fn insert_pending(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO meetings (
                id, user1_id, user2_id, pair_key, match_key, details,
                status, accepted_by, created_at, expires_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (match_key, pair_key) WHERE status = 'pending' DO NOTHING
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.user1_id)
        .bind(&self.user2_id)
        .bind(&self.pair_key)
        .bind(&self.match_key)
        .bind(&self.details)
        .bind(self.status)
        .bind(&self.accepted_by)
        .bind(self.created_at)
        .bind(self.expires_at)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: MeetingId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM meetings WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_pending(
        match_key: &str,
        pair_key: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meetings
             WHERE match_key = $1 AND pair_key = $2 AND status = 'pending'",
        )
        .bind(match_key)
        .bind(pair_key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_confirmed_sibling(
        match_key: &str,
        exclude: MeetingId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meetings
             WHERE match_key = $1 AND id <> $2 AND status = 'confirmed'",
        )
        .bind(match_key)
        .bind(exclude)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Compare-and-swap status change.
    ///
    /// A move that collides with the pending-proposal or confirmed-meeting
    /// unique indexes is refused like a failed swap.
    pub async fn transition(
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let updated = sqlx::query_as::<_, Self>(
            "UPDATE meetings SET status = $3 WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(pool)
        .await;

        match updated {
            Ok(meeting) => Ok(meeting),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn supersede_siblings<'e, E>(match_key: &str, keep: MeetingId, executor: E) -> Result<u64>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE meetings SET status = 'superseded'
             WHERE match_key = $1 AND id <> $2 AND status = 'pending'",
        )
        .bind(match_key)
        .bind(keep)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Add `user_ids` to `accepted_by` of a pending meeting and confirm it when
    /// both participants are present, superseding pending siblings in the same
    /// transaction. An empty `user_ids` only re-evaluates confirmation.
    pub async fn record_acceptance(
        id: MeetingId,
        user_ids: &[String],
        pool: &PgPool,
    ) -> Result<AcceptanceOutcome> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Self>(
            "UPDATE meetings
             SET accepted_by = accepted_by || ARRAY(
                     SELECT u FROM unnest($2::text[]) AS u WHERE NOT (u = ANY(accepted_by))
                 ),
                 status = CASE
                     WHEN (accepted_by || $2::text[]) @> ARRAY[user1_id, user2_id]
                     THEN 'confirmed'::meeting_status
                     ELSE status
                 END
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .bind(user_ids)
        .fetch_optional(&mut *tx)
        .await;

        let updated = match updated {
            Ok(Some(meeting)) => meeting,
            Ok(None) => {
                tx.rollback().await?;
                return Ok(match Self::find_by_id(id, pool).await? {
                    Some(meeting) => AcceptanceOutcome::NotPending(meeting),
                    None => AcceptanceOutcome::Missing,
                });
            }
            Err(e) if is_unique_violation(&e) => {
                // Another proposal for this match key was confirmed first.
                tx.rollback().await?;
                return Self::supersede_after_lost_race(id, pool).await;
            }
            Err(e) => return Err(e.into()),
        };

        if updated.status == MeetingStatus::Confirmed {
            Self::supersede_siblings(&updated.match_key, updated.id, &mut *tx).await?;
        }

        tx.commit().await?;
        Ok(AcceptanceOutcome::Applied(updated))
    }

    async fn supersede_after_lost_race(id: MeetingId, pool: &PgPool) -> Result<AcceptanceOutcome> {
        let meeting =
            match Self::transition(id, MeetingStatus::Pending, MeetingStatus::Superseded, pool)
                .await?
            {
                Some(meeting) => meeting,
                None => {
                    return Ok(match Self::find_by_id(id, pool).await? {
                        Some(meeting) => AcceptanceOutcome::NotPending(meeting),
                        None => AcceptanceOutcome::Missing,
                    })
                }
            };

        match Self::find_confirmed_sibling(&meeting.match_key, meeting.id, pool).await? {
            Some(confirmed) => Ok(AcceptanceOutcome::Superseded { meeting, confirmed }),
            None => Ok(AcceptanceOutcome::NotPending(meeting)),
        }
    }

    /// Retention: drop terminal meetings created before `cutoff`.
    pub async fn delete_terminal_before(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM meetings WHERE status <> 'pending' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(auto_accept: bool) -> Meeting {
        Meeting::new(
            "match-1".to_string(),
            "ann@example.com".to_string(),
            "bob@example.com".to_string(),
            serde_json::json!({"venue": "Curry House"}),
            auto_accept,
            Duration::seconds(30),
            Utc::now(),
        )
    }

    #[test]
    fn test_auto_accept_seeds_proposer() {
        assert_eq!(proposal(true).accepted_by, vec!["ann@example.com".to_string()]);
        assert!(proposal(false).accepted_by.is_empty());
    }

    #[test]
    fn test_fully_accepted_needs_both_participants() {
        let mut meeting = proposal(true);
        assert!(!meeting.is_fully_accepted());

        meeting.accepted_by.push("bob@example.com".to_string());
        assert!(meeting.is_fully_accepted());
    }

    #[test]
    fn test_remaining_seconds_is_zero_once_terminal() {
        let now = Utc::now();
        let mut meeting = proposal(true);
        assert!(meeting.remaining_seconds(now) > 0);

        meeting.status = MeetingStatus::Expired;
        assert_eq!(meeting.remaining_seconds(now), 0);
    }

    #[test]
    fn test_remaining_seconds_never_negative() {
        let meeting = proposal(true);
        assert_eq!(meeting.remaining_seconds(meeting.expires_at + Duration::seconds(5)), 0);
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!MeetingStatus::Pending.is_terminal());
        assert!(MeetingStatus::Confirmed.is_terminal());
        assert!(MeetingStatus::Expired.is_terminal());
        assert!(MeetingStatus::Superseded.is_terminal());
    }
}
