// Main entry point for API server

use std::sync::Arc;

use anyhow::{Context, Result};
use async_nats::jetstream;
use mealmatch_core::kernel::jobs::{
    ConsumerGatedQueue, ConsumerLink, JetStreamTaskQueue, JetStreamTaskSource, PollerConfig,
    PollerHandoffQueue, PollingTaskSource, TaskQueue, TaskSource, TaskWorker,
};
use mealmatch_core::kernel::{
    start_scheduler, BaseAccountDirectory, BaseNotifier, BaseVenueCatalog, HttpAccountDirectory,
    HttpVenueCatalog, LoggingNotifier, MemoryStore, NatsClientPublisher, NatsNotifier,
    NoopAccountDirectory, NoopVenueCatalog, PostgresStore, ServerDeps,
};
use mealmatch_core::server::{build_app, AppState};
use mealmatch_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mealmatch_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Meal Match API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let settings = config.matching.clone();
    tracing::info!("Configuration loaded");

    // NATS is optional; without it events are logged and the poller drives
    // background matching.
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                tracing::info!(url = %url, "NATS connected");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "NATS unreachable, falling back to polling");
                None
            }
        },
        None => None,
    };

    let notifier: Arc<dyn BaseNotifier> = match &nats {
        Some(client) => Arc::new(NatsNotifier::new(Arc::new(NatsClientPublisher::new(
            client.clone(),
        )))),
        None => Arc::new(LoggingNotifier),
    };

    let accounts: Arc<dyn BaseAccountDirectory> = match &config.account_service_url {
        Some(url) => Arc::new(HttpAccountDirectory::new(
            url.as_str(),
            settings.collaborator_timeout,
        )),
        None => Arc::new(NoopAccountDirectory),
    };

    let venues: Arc<dyn BaseVenueCatalog> = match &config.venue_service_url {
        Some(url) => Arc::new(HttpVenueCatalog::new(url.as_str(), settings.collaborator_timeout)),
        None => Arc::new(NoopVenueCatalog),
    };

    let (task_queue, queue_source): (Arc<dyn TaskQueue>, Option<Box<dyn TaskSource>>) = match &nats
    {
        Some(client) => {
            let context = jetstream::new(client.clone());
            // Intake stops publishing once the worker abandons the consumer.
            let link = ConsumerLink::new();
            match JetStreamTaskSource::connect(&context, link.clone()).await {
                Ok(source) => (
                    Arc::new(ConsumerGatedQueue::new(JetStreamTaskQueue::new(context), link))
                        as Arc<dyn TaskQueue>,
                    Some(Box::new(source) as Box<dyn TaskSource>),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "JetStream unavailable, falling back to polling");
                    (Arc::new(PollerHandoffQueue) as Arc<dyn TaskQueue>, None)
                }
            }
        }
        None => (Arc::new(PollerHandoffQueue) as Arc<dyn TaskQueue>, None),
    };

    let deps = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            ServerDeps::with_store(
                Arc::new(PostgresStore::new(pool)),
                notifier,
                accounts,
                venues,
                task_queue,
                settings.clone(),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            ServerDeps::with_store(
                Arc::new(MemoryStore::new()),
                notifier,
                accounts,
                venues,
                task_queue,
                settings.clone(),
            )
        }
    };

    let state = AppState::new(deps);
    let shutdown = CancellationToken::new();

    // Background matching: JetStream first, the store poller once it is gone.
    let poller: Box<dyn TaskSource> = Box::new(PollingTaskSource::new(
        state.deps.searches.clone(),
        PollerConfig::from(&settings),
    ));
    let worker = match queue_source {
        Some(source) => TaskWorker::new(source, state.intake.clone()).with_fallback(poller),
        None => TaskWorker::new(poller, state.intake.clone()),
    };
    let worker_handle = worker.spawn(shutdown.clone());

    let mut scheduler = start_scheduler(
        state.sweeper.clone(),
        state.purge.clone(),
        settings.sweep_interval,
    )
    .await
    .context("Failed to start scheduler")?;

    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    tracing::info!("Shutting down background tasks");
    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "scheduler shutdown failed");
    }
    if let Err(e) = worker_handle.await {
        tracing::warn!(error = %e, "task worker panicked");
    }

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }
}
