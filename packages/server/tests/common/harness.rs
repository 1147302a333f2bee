//! Postgres fixture for store tests.
//!
//! A single Postgres 16 container is started lazily for the whole test binary
//! and migrated once. Each test gets its own pool over it, so tests must keep
//! to their own user ids.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use mealmatch_core::kernel::PostgresStore;

struct SharedPostgres {
    url: String,
    _container: ContainerAsync<Postgres>,
}

static SHARED_POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn start() -> Result<Self> {
        // RUST_LOG=mealmatch_core=debug surfaces store logs in failing tests.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let container = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            container.get_host().await?,
            container.get_host_port_ipv4(5432).await?
        );

        let pool = PgPool::connect(&url)
            .await
            .context("Failed to connect for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            url,
            _container: container,
        })
    }

    async fn url() -> &'static str {
        let shared = SHARED_POSTGRES
            .get_or_init(|| async {
                Self::start()
                    .await
                    .expect("Postgres test container should start")
            })
            .await;
        &shared.url
    }
}

/// A `PostgresStore` over the shared test database.
pub struct PgHarness {
    pub db_pool: PgPool,
    pub store: Arc<PostgresStore>,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        Self::connect().await.expect("test database should be reachable")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl PgHarness {
    pub async fn connect() -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(SharedPostgres::url().await)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self {
            store: Arc::new(PostgresStore::new(db_pool.clone())),
            db_pool,
        })
    }
}
