//! Entry point for matching work.
//!
//! A submission is matched synchronously against the currently live requests
//! and also queued, so that users who start searching later are still paired
//! with it while it is live. The worker drives `process` for queued tasks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::common::{MatchingError, MatchingResult};
use crate::domains::matching::finder::{self, MatchQuery};
use crate::domains::matching::models::Match;
use crate::domains::matching::store::MatchStore;
use crate::domains::search::models::SearchRequest;
use crate::domains::search::registry::{SearchRegistry, SearchSubmission};
use crate::kernel::jobs::{SearchTask, TaskHandler, TaskQueue};

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub request: SearchRequest,
    /// Matches in force for this request right after the synchronous pass.
    pub direct_matches: Vec<Match>,
    /// False when the queue rejected the task; the poller will pick it up.
    pub queued: bool,
}

pub struct TaskIntake {
    registry: Arc<SearchRegistry>,
    store: Arc<MatchStore>,
    queue: Arc<dyn TaskQueue>,
}

impl TaskIntake {
    pub fn new(
        registry: Arc<SearchRegistry>,
        store: Arc<MatchStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
        }
    }

    #[instrument(skip(self, submission), fields(user_id = %submission.user_id))]
    pub async fn submit(
        &self,
        submission: SearchSubmission,
        now: DateTime<Utc>,
    ) -> MatchingResult<SubmitOutcome> {
        let request = self.registry.submit(submission, now).await?;

        let candidates = self.registry.active_others(&request.user_id, now).await?;
        let found = finder::evaluate(MatchQuery::from(&request), &candidates);
        let direct_matches = self.store.persist(&request.user_id, found).await?;

        let queued = match self.queue.enqueue(&SearchTask::from_request(&request)).await {
            Ok(()) => true,
            Err(e) => {
                let err = MatchingError::UpstreamUnavailable(e.to_string());
                warn!(
                    search_request_id = %request.id,
                    mode = self.queue.mode(),
                    error = %err,
                    "failed to enqueue search task"
                );
                false
            }
        };

        info!(
            search_request_id = %request.id,
            direct_matches = direct_matches.len(),
            queued,
            "search submitted"
        );

        Ok(SubmitOutcome {
            request,
            direct_matches,
            queued,
        })
    }

    /// Re-evaluate a queued task against the requests live at `now`.
    ///
    /// Idempotent: redelivery only finds pairs that already exist. Tasks for
    /// requests that are gone or no longer live are settled without matching.
    #[instrument(skip(self, task), fields(search_request_id = %task.search_request_id))]
    pub async fn process(&self, task: &SearchTask, now: DateTime<Utc>) -> MatchingResult<Vec<Match>> {
        match self.registry.get(task.search_request_id).await {
            Ok(request) if !request.is_live(now) => {
                debug!("search request no longer live, skipping");
                self.registry.mark_processed(request.id).await?;
                return Ok(Vec::new());
            }
            Ok(_) => {}
            Err(MatchingError::NotFound { .. }) => {
                warn!("search task for unknown request, skipping");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        let candidates = self.registry.active_others(&task.user_id, now).await?;
        let found = finder::evaluate(MatchQuery::from(task), &candidates);
        let matches = self.store.persist(&task.user_id, found).await?;

        self.registry.mark_processed(task.search_request_id).await?;

        debug!(matches = matches.len(), "search task processed");
        Ok(matches)
    }
}

#[async_trait]
impl TaskHandler for TaskIntake {
    async fn handle(&self, task: &SearchTask) -> anyhow::Result<()> {
        self.process(task, Utc::now()).await?;
        Ok(())
    }
}
