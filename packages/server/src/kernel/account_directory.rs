//! Account service client used to put display names on match views.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::kernel::{AccountProfile, BaseAccountDirectory};

/// The account service wraps payloads as `{"code": .., "data": {...}}`.
#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    data: Option<serde_json::Value>,
}

pub struct HttpAccountDirectory {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAccountDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn account_url(&self, user_id: &str) -> String {
        format!(
            "{}/account/email/{}",
            self.base_url,
            urlencoding::encode(user_id.trim())
        )
    }
}

#[async_trait]
impl BaseAccountDirectory for HttpAccountDirectory {
    #[instrument(skip(self))]
    async fn resolve(&self, user_id: &str) -> Result<Option<AccountProfile>> {
        let response = self
            .client
            .get(self.account_url(user_id))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow!("Account service request failed: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "account not found");
            return Ok(None);
        }

        let envelope: AccountEnvelope = response
            .error_for_status()
            .map_err(|e| anyhow!("Account service returned an error: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse account response: {}", e))?;

        Ok(envelope.data.map(profile_from_account))
    }
}

fn profile_from_account(account: serde_json::Value) -> AccountProfile {
    let name = account
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    AccountProfile {
        name,
        profile: account,
    }
}

/// Used when no account service is configured. Every lookup misses.
#[derive(Default)]
pub struct NoopAccountDirectory;

#[async_trait]
impl BaseAccountDirectory for NoopAccountDirectory {
    async fn resolve(&self, _user_id: &str) -> Result<Option<AccountProfile>> {
        Ok(None)
    }
}
