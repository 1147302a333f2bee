use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::MatchingResult;
use crate::domains::matching::events::MatchFoundEvent;
use crate::domains::matching::models::Match;
use crate::kernel::{BaseMatchRepository, BaseNotifier, InsertOutcome};

/// Persists candidate matches with per-pair dedup and announces new ones.
pub struct MatchStore {
    repo: Arc<dyn BaseMatchRepository>,
    notifier: Arc<dyn BaseNotifier>,
    notify_timeout: Duration,
}

impl MatchStore {
    pub fn new(
        repo: Arc<dyn BaseMatchRepository>,
        notifier: Arc<dyn BaseNotifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            notifier,
            notify_timeout,
        }
    }

    /// Store every candidate not already covered by a pending match for the
    /// same pair. Returns the matches now in force for these pairs, created or
    /// pre-existing, one per pair.
    ///
    /// Events go out only for newly created matches. Notifier failures are
    /// logged and never fail the call; store failures do.
    pub async fn persist(&self, user_id: &str, candidates: Vec<Match>) -> MatchingResult<Vec<Match>> {
        let mut in_force: Vec<Match> = Vec::with_capacity(candidates.len());
        let mut created = 0usize;

        for candidate in candidates {
            let record = match self.repo.insert_if_absent(&candidate).await? {
                InsertOutcome::Created(record) => {
                    created += 1;
                    self.announce(&record).await;
                    record
                }
                InsertOutcome::Existing(record) => {
                    debug!(pair = %record.pair_key, match_id = %record.id, "pair already matched");
                    record
                }
            };

            if !in_force.iter().any(|m| m.id == record.id) {
                in_force.push(record);
            }
        }

        if created > 0 {
            info!(user_id = %user_id, created, total = in_force.len(), "matches persisted");
        }

        Ok(in_force)
    }

    async fn announce(&self, record: &Match) {
        let event = MatchFoundEvent::from_match(record);

        match tokio::time::timeout(self.notify_timeout, self.notifier.publish(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(match_id = %record.id, error = %e, "failed to publish match-found event");
            }
            Err(_) => {
                warn!(match_id = %record.id, "match-found event publish timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SearchRequestId;
    use crate::kernel::test_dependencies::{FailingNotifier, RecordingNotifier};
    use crate::kernel::MemoryStore;

    fn candidate(user: &str, other: &str) -> Match {
        Match::new(user.into(), other.into(), 0.3, None, SearchRequestId::new())
    }

    #[tokio::test]
    async fn test_persist_creates_once_and_notifies_once() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let matches = MatchStore::new(store.clone(), notifier.clone(), Duration::from_secs(1));

        let first = matches.persist("ann", vec![candidate("ann", "bob")]).await.unwrap();
        let again = matches.persist("bob", vec![candidate("bob", "ann")]).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(again[0].id, first[0].id);
        assert_eq!(store.all_matches().len(), 1);
        assert_eq!(notifier.events().len(), 1);
        assert_eq!(notifier.events()[0].match_id, first[0].id);
    }

    #[tokio::test]
    async fn test_duplicate_candidates_in_one_batch_collapse() {
        let store = Arc::new(MemoryStore::new());
        let matches = MatchStore::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            Duration::from_secs(1),
        );

        let result = matches
            .persist("ann", vec![candidate("ann", "bob"), candidate("ann", "bob")])
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(store.all_matches().len(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_persist() {
        let store = Arc::new(MemoryStore::new());
        let matches = MatchStore::new(store.clone(), Arc::new(FailingNotifier), Duration::from_secs(1));

        let result = matches.persist("ann", vec![candidate("ann", "bob")]).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(store.all_matches().len(), 1);
    }
}
