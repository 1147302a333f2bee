use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::queue::{ClaimedTask, SourceError, TaskQueue, TaskSource};
use super::task::SearchTask;

/// In-process queue backed by an unbounded channel.
pub struct InMemoryTaskQueue {
    sender: mpsc::UnboundedSender<SearchTask>,
}

pub struct InMemoryTaskSource {
    receiver: mpsc::UnboundedReceiver<SearchTask>,
}

/// Create a connected queue/source pair.
pub fn channel() -> (InMemoryTaskQueue, InMemoryTaskSource) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        InMemoryTaskQueue { sender },
        InMemoryTaskSource { receiver },
    )
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &SearchTask) -> Result<()> {
        self.sender
            .send(task.clone())
            .map_err(|_| anyhow!("task channel closed"))
    }

    fn mode(&self) -> &'static str {
        "memory"
    }
}

impl InMemoryTaskSource {
    /// Next queued task without waiting.
    pub fn try_next(&mut self) -> Option<SearchTask> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl TaskSource for InMemoryTaskSource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn claim(&mut self) -> Result<Option<ClaimedTask>, SourceError> {
        Ok(self.receiver.recv().await.map(ClaimedTask::unacknowledged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Coordinates, SearchRequestId};

    fn task() -> SearchTask {
        SearchTask {
            user_id: "ann@example.com".into(),
            location: Coordinates::new(1.3, 103.8),
            venue_filter: None,
            search_request_id: SearchRequestId::new(),
            proximity_threshold_km: 2.0,
        }
    }

    #[tokio::test]
    async fn test_tasks_arrive_in_order() {
        let (queue, mut source) = channel();
        let first = task();
        let second = task();
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(source.claim().await.unwrap().unwrap().task, first);
        assert_eq!(source.claim().await.unwrap().unwrap().task, second);
    }

    #[tokio::test]
    async fn test_source_closes_when_queue_dropped() {
        let (queue, mut source) = channel();
        drop(queue);
        assert!(source.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_fails_once_source_dropped() {
        let (queue, source) = channel();
        drop(source);
        assert!(queue.enqueue(&task()).await.is_err());
    }
}
