//! Kernel module - server infrastructure and dependencies.

pub mod account_directory;
pub mod deps;
pub mod jobs;
pub mod memory_store;
pub mod nats;
pub mod notifier;
pub mod postgres_store;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;
pub mod venue_catalog;

pub use account_directory::{HttpAccountDirectory, NoopAccountDirectory};
pub use deps::ServerDeps;
pub use memory_store::MemoryStore;
pub use nats::{NatsClientPublisher, NatsPublisher, PublishedMessage, TestNats};
pub use notifier::{LoggingNotifier, NatsNotifier};
pub use postgres_store::PostgresStore;
pub use scheduled_tasks::{
    start_scheduler, ExpirySweeper, PurgeReport, RetentionPurge, SweepReport,
};
pub use test_dependencies::TestDependencies;
pub use traits::*;
pub use venue_catalog::{HttpVenueCatalog, NoopVenueCatalog};
