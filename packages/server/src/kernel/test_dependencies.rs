// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::jobs::{channel, InMemoryTaskSource, SearchTask, TaskQueue};
use super::{
    AccountProfile, BaseAccountDirectory, BaseNotifier, BaseVenueCatalog, MemoryStore, ServerDeps,
};
use crate::config::MatchingSettings;
use crate::domains::matching::events::MatchFoundEvent;

// =============================================================================
// Notifiers
// =============================================================================

/// Captures every published event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<MatchFoundEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MatchFoundEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseNotifier for RecordingNotifier {
    async fn publish(&self, event: &MatchFoundEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl BaseNotifier for FailingNotifier {
    async fn publish(&self, _event: &MatchFoundEvent) -> Result<()> {
        Err(anyhow!("notifier unavailable"))
    }
}

// =============================================================================
// Mock Account Directory
// =============================================================================

pub struct MockAccountDirectory {
    names: HashMap<String, String>,
    fail: bool,
    lookups: Mutex<Vec<String>>,
}

impl MockAccountDirectory {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            fail: false,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, user_id: &str, name: &str) -> Self {
        self.names.insert(user_id.to_string(), name.to_string());
        self
    }

    /// Every lookup errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl Default for MockAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAccountDirectory for MockAccountDirectory {
    async fn resolve(&self, user_id: &str) -> Result<Option<AccountProfile>> {
        self.lookups.lock().unwrap().push(user_id.to_string());
        if self.fail {
            return Err(anyhow!("account service unavailable"));
        }

        Ok(self.names.get(user_id).map(|name| AccountProfile {
            name: Some(name.clone()),
            profile: serde_json::Value::Null,
        }))
    }
}

// =============================================================================
// Mock Venue Catalog
// =============================================================================

#[derive(Default)]
pub struct MockVenueCatalog {
    venues: HashMap<String, serde_json::Value>,
}

impl MockVenueCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_venue(mut self, name: &str, details: serde_json::Value) -> Self {
        self.venues.insert(name.to_string(), details);
        self
    }
}

#[async_trait]
impl BaseVenueCatalog for MockVenueCatalog {
    async fn resolve(&self, name_or_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.venues.get(name_or_id).cloned())
    }
}

// =============================================================================
// Task queues
// =============================================================================

/// Rejects every enqueue, as an unreachable broker would.
pub struct FailingTaskQueue;

#[async_trait]
impl TaskQueue for FailingTaskQueue {
    async fn enqueue(&self, _task: &SearchTask) -> Result<()> {
        Err(anyhow!("broker unreachable"))
    }

    fn mode(&self) -> &'static str {
        "failing"
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub accounts: Arc<MockAccountDirectory>,
    pub venues: Arc<MockVenueCatalog>,
    pub settings: MatchingSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            accounts: Arc::new(MockAccountDirectory::new()),
            venues: Arc::new(MockVenueCatalog::new()),
            settings: MatchingSettings::default(),
        }
    }

    /// Set a mock account directory
    pub fn mock_accounts(mut self, accounts: MockAccountDirectory) -> Self {
        self.accounts = Arc::new(accounts);
        self
    }

    /// Set a mock venue catalog
    pub fn mock_venues(mut self, venues: MockVenueCatalog) -> Self {
        self.venues = Arc::new(venues);
        self
    }

    pub fn settings(mut self, settings: MatchingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Convert into ServerDeps backed by an in-memory task channel. The
    /// returned source receives everything intake enqueues.
    pub fn into_deps(self) -> (ServerDeps, InMemoryTaskSource) {
        let (queue, source) = channel();
        let deps = ServerDeps::with_store(
            self.store,
            self.notifier,
            self.accounts,
            self.venues,
            Arc::new(queue),
            self.settings,
        );
        (deps, source)
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
