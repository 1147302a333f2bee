//! JetStream work queue for search tasks.
//!
//! One work-queue stream, one durable pull consumer shared by every worker
//! instance. `max_ack_pending = 1` keeps delivery serialized (prefetch 1);
//! a task is acked only after its matches are persisted and nak'd otherwise.

use anyhow::{Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{
        pull::{self, MessagesErrorKind},
        AckPolicy, PullConsumer,
    },
    stream::RetentionPolicy,
    AckKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{info, warn};

use super::queue::{ClaimedTask, ConsumerLink, SourceError, TaskQueue, TaskSource};
use super::task::SearchTask;

pub const SEARCH_TASKS_STREAM: &str = "SEARCH_TASKS";
pub const SEARCH_TASKS_SUBJECT: &str = "search.tasks";
pub const SEARCH_TASKS_CONSUMER: &str = "search-task-worker";

/// Create the stream if it does not exist yet.
pub async fn ensure_stream(context: &jetstream::Context) -> Result<jetstream::stream::Stream> {
    context
        .get_or_create_stream(jetstream::stream::Config {
            name: SEARCH_TASKS_STREAM.to_string(),
            subjects: vec![SEARCH_TASKS_SUBJECT.to_string()],
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .context("Failed to create search task stream")
}

pub struct JetStreamTaskQueue {
    context: jetstream::Context,
}

impl JetStreamTaskQueue {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TaskQueue for JetStreamTaskQueue {
    async fn enqueue(&self, task: &SearchTask) -> Result<()> {
        let payload = Bytes::from(task.to_bytes().context("Failed to serialize search task")?);

        // The second await waits for the stream to persist the message.
        self.context
            .publish(SEARCH_TASKS_SUBJECT, payload)
            .await
            .context("Failed to publish search task")?
            .await
            .context("Search task was not acknowledged by the stream")?;

        Ok(())
    }

    fn mode(&self) -> &'static str {
        "jetstream"
    }
}

pub struct JetStreamTaskSource {
    messages: pull::Stream,
    link: ConsumerLink,
}

impl JetStreamTaskSource {
    /// `link` is marked lost when this source gives up on its transport.
    pub async fn connect(context: &jetstream::Context, link: ConsumerLink) -> Result<Self> {
        let stream = ensure_stream(context).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                SEARCH_TASKS_CONSUMER,
                pull::Config {
                    durable_name: Some(SEARCH_TASKS_CONSUMER.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .context("Failed to create search task consumer")?;

        let messages = consumer
            .messages()
            .await
            .context("Failed to open search task message stream")?;

        info!(
            stream = SEARCH_TASKS_STREAM,
            consumer = SEARCH_TASKS_CONSUMER,
            "jetstream task source ready"
        );

        Ok(Self { messages, link })
    }

    fn lost(&self, error: anyhow::Error) -> SourceError {
        self.link.mark_lost();
        SourceError::TransportLost(error)
    }
}

/// Missed heartbeats and failed pull requests recover on the same stream.
/// A deleted consumer does not.
fn ends_consumption(kind: MessagesErrorKind) -> bool {
    matches!(
        kind,
        MessagesErrorKind::ConsumerDeleted | MessagesErrorKind::PushBasedConsumer
    )
}

#[async_trait]
impl TaskSource for JetStreamTaskSource {
    fn name(&self) -> &'static str {
        "jetstream"
    }

    async fn claim(&mut self) -> Result<Option<ClaimedTask>, SourceError> {
        loop {
            let message = match self.messages.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) if ends_consumption(e.kind()) => {
                    return Err(self.lost(anyhow::anyhow!("jetstream delivery failed: {}", e)))
                }
                Some(Err(e)) => {
                    return Err(SourceError::Transient(anyhow::anyhow!(
                        "jetstream delivery hiccup: {}",
                        e
                    )))
                }
                None => return Err(self.lost(anyhow::anyhow!("jetstream message stream closed"))),
            };

            match SearchTask::from_bytes(&message.payload) {
                Ok(task) => return Ok(Some(ClaimedTask::from_jetstream(task, message))),
                Err(e) => {
                    // Redelivering an unparseable payload can never succeed.
                    warn!(error = %e, "dropping malformed search task");
                    if let Err(e) = message.ack_with(AckKind::Term).await {
                        warn!(error = %e, "failed to terminate malformed search task");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_heartbeat_is_recoverable() {
        assert!(!ends_consumption(MessagesErrorKind::MissingHeartbeat));
        assert!(!ends_consumption(MessagesErrorKind::Pull));
    }

    #[test]
    fn test_deleted_consumer_ends_consumption() {
        assert!(ends_consumption(MessagesErrorKind::ConsumerDeleted));
    }
}
