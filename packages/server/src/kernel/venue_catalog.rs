//! Restaurant catalog client, used only to attach venue details to matches.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::kernel::BaseVenueCatalog;

#[derive(Debug, Deserialize)]
struct VenueEnvelope {
    data: Option<serde_json::Value>,
}

pub struct HttpVenueCatalog {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpVenueCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl BaseVenueCatalog for HttpVenueCatalog {
    #[instrument(skip(self))]
    async fn resolve(&self, name_or_id: &str) -> Result<Option<serde_json::Value>> {
        let response = self
            .client
            .post(format!("{}/restaurants/get_by_name", self.base_url))
            .json(&json!({ "name": name_or_id }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow!("Venue catalog request failed: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: VenueEnvelope = response
            .error_for_status()
            .map_err(|e| anyhow!("Venue catalog returned an error: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse venue catalog response: {}", e))?;

        Ok(envelope.data)
    }
}

#[derive(Default)]
pub struct NoopVenueCatalog;

#[async_trait]
impl BaseVenueCatalog for NoopVenueCatalog {
    async fn resolve(&self, _name_or_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}
