//! Search task transport.
//!
//! Intake enqueues a `SearchTask` for every submission; `TaskWorker` drains a
//! `TaskSource` and hands each task to the matching pipeline.

pub mod jetstream;
pub mod memory;
pub mod poller;
pub mod queue;
pub mod task;
pub mod worker;

pub use jetstream::{JetStreamTaskQueue, JetStreamTaskSource};
pub use memory::{channel, InMemoryTaskQueue, InMemoryTaskSource};
pub use poller::{PollerConfig, PollingTaskSource};
pub use queue::{
    ClaimedTask, ConsumerGatedQueue, ConsumerLink, PollerHandoffQueue, SourceError, TaskQueue,
    TaskSource,
};
pub use task::SearchTask;
pub use worker::{TaskHandler, TaskWorker};
