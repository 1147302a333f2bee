//! Task transport seams.
//!
//! `TaskQueue` is the producer side used by intake. `TaskSource` is the
//! consumer side driven by `TaskWorker`. JetStream, the store poller and the
//! in-memory channel each implement the source side, so the matching core
//! never knows which transport delivered a task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use tracing::debug;

use super::task::SearchTask;
use crate::common::SearchRequestId;
use crate::kernel::BaseSearchRequestRepository;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &SearchTask) -> Result<()>;

    /// Short transport name for logs and the health endpoint.
    fn mode(&self) -> &'static str;
}

/// Why a source stopped yielding tasks.
#[derive(Debug)]
pub enum SourceError {
    /// The underlying transport is gone; the worker should move to the next source.
    TransportLost(anyhow::Error),
    /// A transient failure; retry the same source after a pause.
    Transient(anyhow::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::TransportLost(e) => write!(f, "transport lost: {}", e),
            SourceError::Transient(e) => write!(f, "transient failure: {}", e),
        }
    }
}

#[async_trait]
pub trait TaskSource: Send {
    fn name(&self) -> &'static str;

    /// Claim the next task, waiting until one is available.
    ///
    /// `Ok(None)` means the source is closed and will never yield again.
    async fn claim(&mut self) -> std::result::Result<Option<ClaimedTask>, SourceError>;
}

enum Acknowledgement {
    JetStream(jetstream::Message),
    MarkProcessed {
        repo: Arc<dyn BaseSearchRequestRepository>,
        id: SearchRequestId,
    },
    None,
}

/// A task handed to the worker together with whatever it needs to settle it.
pub struct ClaimedTask {
    pub task: SearchTask,
    ack: Acknowledgement,
}

impl ClaimedTask {
    pub fn from_jetstream(task: SearchTask, message: jetstream::Message) -> Self {
        Self {
            task,
            ack: Acknowledgement::JetStream(message),
        }
    }

    pub fn from_poll(task: SearchTask, repo: Arc<dyn BaseSearchRequestRepository>) -> Self {
        let id = task.search_request_id;
        Self {
            task,
            ack: Acknowledgement::MarkProcessed { repo, id },
        }
    }

    pub fn unacknowledged(task: SearchTask) -> Self {
        Self {
            task,
            ack: Acknowledgement::None,
        }
    }

    /// Settle after successful persistence.
    pub async fn mark_succeeded(self) -> Result<()> {
        match self.ack {
            Acknowledgement::JetStream(message) => {
                message.ack().await.map_err(|e| anyhow!("ack failed: {}", e))
            }
            Acknowledgement::MarkProcessed { repo, id } => repo.mark_processed(id).await,
            Acknowledgement::None => Ok(()),
        }
    }

    /// Return the task for redelivery.
    ///
    /// Polled tasks stay unprocessed and are picked up by the next poll while
    /// they are still inside the lookback window.
    pub async fn mark_failed(self) -> Result<()> {
        match self.ack {
            Acknowledgement::JetStream(message) => message
                .ack_with(AckKind::Nak(None))
                .await
                .map_err(|e| anyhow!("nak failed: {}", e)),
            Acknowledgement::MarkProcessed { id, .. } => {
                debug!(search_request_id = %id, "leaving polled request unprocessed");
                Ok(())
            }
            Acknowledgement::None => Ok(()),
        }
    }
}

/// Producer used when no broker is configured. The poller picks requests
/// up from the store instead.
#[derive(Default)]
pub struct PollerHandoffQueue;

#[async_trait]
impl TaskQueue for PollerHandoffQueue {
    async fn enqueue(&self, task: &SearchTask) -> Result<()> {
        debug!(
            search_request_id = %task.search_request_id,
            "no broker configured; request left for the poller"
        );
        Ok(())
    }

    fn mode(&self) -> &'static str {
        "polling"
    }
}

/// Whether the broker-side consumer is still being drained.
///
/// The JetStream source marks the link lost when it gives up on its
/// transport. From then on `ConsumerGatedQueue` stops publishing, since the
/// worker has moved to the poller and nothing would consume the messages.
#[derive(Debug, Clone)]
pub struct ConsumerLink(Arc<AtomicBool>);

impl ConsumerLink {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_lost(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for ConsumerLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes through `inner` while its consumer is up, then leaves requests
/// for the poller.
pub struct ConsumerGatedQueue<Q> {
    inner: Q,
    link: ConsumerLink,
}

impl<Q: TaskQueue> ConsumerGatedQueue<Q> {
    pub fn new(inner: Q, link: ConsumerLink) -> Self {
        Self { inner, link }
    }
}

#[async_trait]
impl<Q: TaskQueue> TaskQueue for ConsumerGatedQueue<Q> {
    async fn enqueue(&self, task: &SearchTask) -> Result<()> {
        if self.link.is_up() {
            self.inner.enqueue(task).await
        } else {
            PollerHandoffQueue.enqueue(task).await
        }
    }

    fn mode(&self) -> &'static str {
        if self.link.is_up() {
            self.inner.mode()
        } else {
            PollerHandoffQueue.mode()
        }
    }
}
