//! Server dependencies shared by every service (using traits for testability)
//!
//! Stores, collaborators and the task queue are all trait objects so the same
//! wiring runs against Postgres and JetStream in production and against the
//! in-memory store and channel in tests.

use std::sync::Arc;

use crate::config::MatchingSettings;
use crate::kernel::jobs::TaskQueue;
use crate::kernel::{
    BaseAccountDirectory, BaseMatchRepository, BaseMeetingRepository, BaseNotifier,
    BaseSearchRequestRepository, BaseVenueCatalog,
};

#[derive(Clone)]
pub struct ServerDeps {
    pub searches: Arc<dyn BaseSearchRequestRepository>,
    pub matches: Arc<dyn BaseMatchRepository>,
    pub meetings: Arc<dyn BaseMeetingRepository>,
    pub notifier: Arc<dyn BaseNotifier>,
    pub accounts: Arc<dyn BaseAccountDirectory>,
    pub venues: Arc<dyn BaseVenueCatalog>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub settings: MatchingSettings,
}

impl ServerDeps {
    /// Wire all three repositories to one store.
    pub fn with_store<S>(
        store: Arc<S>,
        notifier: Arc<dyn BaseNotifier>,
        accounts: Arc<dyn BaseAccountDirectory>,
        venues: Arc<dyn BaseVenueCatalog>,
        task_queue: Arc<dyn TaskQueue>,
        settings: MatchingSettings,
    ) -> Self
    where
        S: BaseSearchRequestRepository + BaseMatchRepository + BaseMeetingRepository + 'static,
    {
        Self {
            searches: store.clone(),
            matches: store.clone(),
            meetings: store,
            notifier,
            accounts,
            venues,
            task_queue,
            settings,
        }
    }
}
