use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::queue::{ClaimedTask, SourceError, TaskSource};
use super::task::SearchTask;
use crate::config::MatchingSettings;
use crate::kernel::BaseSearchRequestRepository;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub batch_size: i64,
    /// Only requests created within this window are picked up.
    pub lookback: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 5,
            lookback: Duration::from_secs(300),
        }
    }
}

impl From<&MatchingSettings> for PollerConfig {
    fn from(settings: &MatchingSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            batch_size: settings.poll_batch_size,
            lookback: settings.poll_lookback,
        }
    }
}

/// Reads unprocessed search requests straight from the store.
///
/// Used when no broker is configured and as the fallback once the broker
/// connection is lost. A claimed request is marked processed on success.
pub struct PollingTaskSource {
    repo: Arc<dyn BaseSearchRequestRepository>,
    config: PollerConfig,
    buffer: VecDeque<SearchTask>,
    polled_once: bool,
}

impl PollingTaskSource {
    pub fn new(repo: Arc<dyn BaseSearchRequestRepository>, config: PollerConfig) -> Self {
        Self {
            repo,
            config,
            buffer: VecDeque::new(),
            polled_once: false,
        }
    }

    async fn poll(&mut self) -> anyhow::Result<()> {
        let lookback = chrono::Duration::from_std(self.config.lookback)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let since = Utc::now() - lookback;

        let requests = self
            .repo
            .find_unprocessed_since(since, self.config.batch_size)
            .await?;

        if !requests.is_empty() {
            debug!(count = requests.len(), "found unprocessed search requests");
        }

        self.buffer
            .extend(requests.iter().map(SearchTask::from_request));
        Ok(())
    }
}

#[async_trait]
impl TaskSource for PollingTaskSource {
    fn name(&self) -> &'static str {
        "poller"
    }

    async fn claim(&mut self) -> Result<Option<ClaimedTask>, SourceError> {
        loop {
            if let Some(task) = self.buffer.pop_front() {
                return Ok(Some(ClaimedTask::from_poll(task, self.repo.clone())));
            }

            if self.polled_once {
                tokio::time::sleep(self.config.interval).await;
            }
            self.polled_once = true;

            self.poll().await.map_err(SourceError::Transient)?;
        }
    }
}
