//! Match-found notifiers.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::domains::matching::events::MatchFoundEvent;
use crate::kernel::{BaseNotifier, NatsPublisher};

/// Publishes each event as JSON to `matches.found` and to both participants'
/// `users.<id>.matches` subjects.
pub struct NatsNotifier {
    publisher: Arc<dyn NatsPublisher>,
}

impl NatsNotifier {
    pub fn new(publisher: Arc<dyn NatsPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl BaseNotifier for NatsNotifier {
    async fn publish(&self, event: &MatchFoundEvent) -> Result<()> {
        let payload = Bytes::from(
            serde_json::to_vec(event).context("Failed to serialize match-found event")?,
        );

        for subject in event.subjects() {
            self.publisher
                .publish(subject.clone(), payload.clone())
                .await
                .with_context(|| format!("Failed to publish to {}", subject))?;
        }

        Ok(())
    }
}

/// Used when no NATS server is configured.
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl BaseNotifier for LoggingNotifier {
    async fn publish(&self, event: &MatchFoundEvent) -> Result<()> {
        info!(
            match_id = %event.match_id,
            user_id = %event.user_id,
            match_user_id = %event.match_user_id,
            distance_km = event.distance_km,
            "match found"
        );
        Ok(())
    }
}
