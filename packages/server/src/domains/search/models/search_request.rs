use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{Coordinates, SearchRequestId, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "search_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Active,
    Expired,
}

/// A user's time-boxed request to be matched with someone nearby.
///
/// Requests are soft-expired, never deleted by the matching pipeline. Only the
/// retention purge removes rows.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub id: SearchRequestId,
    pub user_id: String,
    #[sqlx(flatten)]
    pub location: Coordinates,
    pub venue_filter: Option<Json<Venue>>,
    pub proximity_threshold_km: f64,
    pub status: SearchStatus,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SearchRequest {
    pub fn new(
        user_id: String,
        location: Coordinates,
        venue_filter: Option<Venue>,
        proximity_threshold_km: f64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SearchRequestId::new(),
            user_id,
            location,
            venue_filter: Venue::normalize(venue_filter).map(Json),
            proximity_threshold_km,
            status: SearchStatus::Active,
            processed: false,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Active and not yet past its deadline.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SearchStatus::Active && self.expires_at > now
    }

    pub fn venue(&self) -> Option<&Venue> {
        self.venue_filter.as_ref().map(|v| &v.0)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO search_requests (
                id, user_id, lat, lng, venue_filter, proximity_threshold_km,
                status, processed, created_at, expires_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.user_id)
        .bind(self.location.lat)
        .bind(self.location.lng)
        .bind(&self.venue_filter)
        .bind(self.proximity_threshold_km)
        .bind(self.status)
        .bind(self.processed)
        .bind(self.created_at)
        .bind(self.expires_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: SearchRequestId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM search_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Live requests from everyone except `user_id`.
    pub async fn find_live_except(
        user_id: &str,
        now: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM search_requests
             WHERE user_id <> $1
               AND status = 'active'
               AND expires_at > $2
             ORDER BY created_at",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_processed(id: SearchRequestId, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE search_requests SET processed = true WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Expire a single request immediately (client cancel).
    pub async fn cancel(
        id: SearchRequestId,
        now: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE search_requests
             SET status = 'expired', expires_at = LEAST(expires_at, $2)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Unprocessed requests created after `since`, oldest first.
    pub async fn find_unprocessed_since(
        since: DateTime<Utc>,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM search_requests
             WHERE processed = false
               AND created_at > $1
             ORDER BY created_at
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Flip every active request past its deadline to expired.
    pub async fn expire_stale(now: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE search_requests SET status = 'expired'
             WHERE status = 'active' AND expires_at < $1",
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn live_user_ids(now: DateTime<Utc>, pool: &PgPool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM search_requests
             WHERE status = 'active' AND expires_at >= $1",
        )
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete_created_before(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_requests WHERE created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(now: DateTime<Utc>) -> SearchRequest {
        SearchRequest::new(
            "ann@example.com".to_string(),
            Coordinates::new(1.3, 103.8),
            Some(Venue::named("Curry House")),
            2.0,
            Duration::seconds(20),
            now,
        )
    }

    #[test]
    fn test_new_request_expires_after_ttl() {
        let now = Utc::now();
        let req = request(now);
        assert_eq!(req.expires_at - req.created_at, Duration::seconds(20));
        assert_eq!(req.status, SearchStatus::Active);
        assert!(!req.processed);
    }

    #[test]
    fn test_is_live_until_deadline() {
        let now = Utc::now();
        let req = request(now);
        assert!(req.is_live(now + Duration::seconds(19)));
        assert!(!req.is_live(now + Duration::seconds(20)));
    }

    #[test]
    fn test_blank_venue_filter_is_dropped() {
        let req = SearchRequest::new(
            "ann@example.com".to_string(),
            Coordinates::new(1.3, 103.8),
            Some(Venue::default()),
            2.0,
            Duration::seconds(20),
            Utc::now(),
        );
        assert!(req.venue().is_none());
    }
}
