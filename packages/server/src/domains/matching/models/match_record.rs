use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{pair_key, MatchId, SearchRequestId, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Expired,
}

/// One logical match between two searching users.
///
/// Stored once per pair. `user_id` is the participant whose search produced
/// the match; `view_for` derives either participant's perspective. At most one
/// pending row exists per `pair_key`.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub user_id: String,
    pub match_user_id: String,
    pub pair_key: String,
    pub distance_km: f64,
    pub venue: Option<Json<Venue>>,
    pub status: MatchStatus,
    pub search_request_id: SearchRequestId,
    pub created_at: DateTime<Utc>,
}

/// A match as seen by one of its participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: MatchId,
    pub user_id: String,
    pub match_user_id: String,
    pub match_name: Option<String>,
    pub distance_km: f64,
    pub venue: Option<Venue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_details: Option<serde_json::Value>,
    pub status: MatchStatus,
    pub search_request_id: SearchRequestId,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(
        user_id: String,
        match_user_id: String,
        distance_km: f64,
        venue: Option<Venue>,
        search_request_id: SearchRequestId,
    ) -> Self {
        Self {
            id: MatchId::new(),
            pair_key: pair_key(&user_id, &match_user_id),
            user_id,
            match_user_id,
            distance_km,
            venue: venue.map(Json),
            status: MatchStatus::Pending,
            search_request_id,
            created_at: Utc::now(),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_id == user_id || self.match_user_id == user_id
    }

    /// The other participant, if `user_id` is one of the two.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user_id == user_id {
            Some(&self.match_user_id)
        } else if self.match_user_id == user_id {
            Some(&self.user_id)
        } else {
            None
        }
    }

    /// Normalize to `viewer`'s perspective: `user_id` is always the viewer.
    pub fn view_for(&self, viewer: &str) -> Option<MatchView> {
        let other = self.counterpart(viewer)?;
        Some(MatchView {
            id: self.id,
            user_id: viewer.to_string(),
            match_user_id: other.to_string(),
            match_name: None,
            distance_km: self.distance_km,
            venue: self.venue.as_ref().map(|v| v.0.clone()),
            venue_details: None,
            status: self.status,
            search_request_id: self.search_request_id,
            created_at: self.created_at,
        })
    }

    /// Insert unless a pending match already covers the pair.
    ///
    /// Returns `None` when the partial unique index on `pair_key` rejected the
    /// row, in which case the caller fetches the existing match.
    pub async fn insert_if_absent(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO matches (
                id, user_id, match_user_id, pair_key, distance_km, venue,
                status, search_request_id, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (pair_key) WHERE status = 'pending' DO NOTHING
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.user_id)
        .bind(&self.match_user_id)
        .bind(&self.pair_key)
        .bind(self.distance_km)
        .bind(&self.venue)
        .bind(self.status)
        .bind(self.search_request_id)
        .bind(self.created_at)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_pending_by_pair(pair_key: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM matches WHERE pair_key = $1 AND status = 'pending'",
        )
        .bind(pair_key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: MatchId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_pending_for_user(user_id: &str, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM matches
             WHERE status = 'pending'
               AND (user_id = $1 OR match_user_id = $1)
             ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Expire pending matches where either participant is not in `active_users`.
    pub async fn expire_inactive(active_users: &[String], pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE matches SET status = 'expired'
             WHERE status = 'pending'
               AND (NOT (user_id = ANY($1)) OR NOT (match_user_id = ANY($1)))",
        )
        .bind(active_users)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Expire pending matches whose originating search has expired.
    pub async fn expire_for_expired_searches(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE matches m SET status = 'expired'
             FROM search_requests s
             WHERE m.search_request_id = s.id
               AND m.status = 'pending'
               AND s.status = 'expired'",
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Retention: drop expired matches created before `cutoff`.
    pub async fn delete_expired_before(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM matches WHERE status = 'expired' AND created_at < $1")
                .bind(cutoff)
                .execute(pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Match {
        Match::new(
            "ann@example.com".to_string(),
            "bob@example.com".to_string(),
            0.12,
            Some(Venue::named("Curry House")),
            SearchRequestId::new(),
        )
    }

    #[test]
    fn test_new_match_is_pending_with_canonical_pair_key() {
        let m = sample();
        assert_eq!(m.status, MatchStatus::Pending);
        assert_eq!(m.pair_key, pair_key("bob@example.com", "ann@example.com"));
    }

    #[test]
    fn test_view_for_counterpart_swaps_fields() {
        let m = sample();

        let ann = m.view_for("ann@example.com").unwrap();
        assert_eq!(ann.user_id, "ann@example.com");
        assert_eq!(ann.match_user_id, "bob@example.com");

        let bob = m.view_for("bob@example.com").unwrap();
        assert_eq!(bob.user_id, "bob@example.com");
        assert_eq!(bob.match_user_id, "ann@example.com");
        assert_eq!(bob.id, ann.id);
    }

    #[test]
    fn test_view_for_stranger_is_none() {
        assert!(sample().view_for("eve@example.com").is_none());
    }
}
