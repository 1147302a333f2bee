//! Background worker for search tasks.
//!
//! ```text
//! TaskWorker
//!     │
//!     ├─► claim from the current source (JetStream, poller, channel)
//!     ├─► TaskHandler::handle (match + persist)
//!     └─► mark succeeded (ack) / failed (nak)
//!
//! source reports TransportLost ──► switch to the next source in the chain
//! ```
//!
//! Tasks are processed one at a time. Once claimed, a task always runs to
//! completion; shutdown is only observed between tasks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::{ClaimedTask, SourceError, TaskSource};
use super::task::SearchTask;

/// Pause before retrying a source after a transient failure.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &SearchTask) -> Result<()>;
}

pub struct TaskWorker {
    /// Preferred source first. The last one is kept until shutdown.
    sources: VecDeque<Box<dyn TaskSource>>,
    handler: Arc<dyn TaskHandler>,
}

impl TaskWorker {
    pub fn new(primary: Box<dyn TaskSource>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            sources: VecDeque::from([primary]),
            handler,
        }
    }

    /// Source to switch to when the current one loses its transport.
    pub fn with_fallback(mut self, fallback: Box<dyn TaskSource>) -> Self {
        self.sources.push_back(fallback);
        self
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(shutdown).await {
                error!(error = %e, "task worker exited with error");
            }
        })
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let Some(mut source) = self.sources.pop_front() else {
            warn!("task worker started without a source");
            return Ok(());
        };
        info!(source = source.name(), "task worker starting");

        loop {
            let claimed = tokio::select! {
                _ = shutdown.cancelled() => break,
                claimed = source.claim() => claimed,
            };

            match claimed {
                Ok(Some(task)) => process(self.handler.as_ref(), task).await,
                Ok(None) => {
                    info!(source = source.name(), "task source closed");
                    match self.sources.pop_front() {
                        Some(next) => source = next,
                        None => break,
                    }
                }
                Err(SourceError::TransportLost(e)) => match self.sources.pop_front() {
                    Some(next) => {
                        warn!(
                            from = source.name(),
                            to = next.name(),
                            error = %e,
                            "task transport lost, switching source"
                        );
                        source = next;
                    }
                    None => {
                        error!(source = source.name(), error = %e, "task transport lost, retrying");
                        if pause(&shutdown).await {
                            break;
                        }
                    }
                },
                Err(SourceError::Transient(e)) => {
                    warn!(source = source.name(), error = %e, "failed to claim task");
                    if pause(&shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(source = source.name(), "task worker stopped");
        Ok(())
    }
}

async fn process(handler: &dyn TaskHandler, claimed: ClaimedTask) {
    let search_request_id = claimed.task.search_request_id;

    match handler.handle(&claimed.task).await {
        Ok(()) => {
            debug!(search_request_id = %search_request_id, "search task succeeded");
            if let Err(e) = claimed.mark_succeeded().await {
                error!(search_request_id = %search_request_id, error = %e, "failed to ack search task");
            }
        }
        Err(e) => {
            warn!(search_request_id = %search_request_id, error = %e, "search task failed");
            if let Err(e) = claimed.mark_failed().await {
                error!(search_request_id = %search_request_id, error = %e, "failed to nak search task");
            }
        }
    }
}

/// Returns true if shutdown was requested while waiting.
async fn pause(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(TRANSIENT_RETRY_DELAY) => false,
    }
}
