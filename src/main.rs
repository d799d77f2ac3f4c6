//! Libris Server - library catalog, borrowing and reviews
//!
//! Loads configuration, selects a storage backend and serves the REST API.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::{AppConfig, SearchMode, StorageBackend},
    repository::Repository,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let lock_timeout = Duration::from_millis(config.database.lock_timeout_ms);
    let repository = match config.database.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            if config.database.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("Database migrations completed");
            }

            if config.search.mode == SearchMode::Ranked {
                let trigram_installed: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'pg_trgm')",
                )
                .fetch_one(&pool)
                .await?;
                if !trigram_installed {
                    anyhow::bail!(
                        "ranked search requires the pg_trgm extension; install it or set search.mode = \"basic\""
                    );
                }
            }

            Repository::postgres(pool, lock_timeout)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory backend; data is lost on shutdown");
            Repository::in_memory(lock_timeout)
        }
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );
    let bootstrap_admin = config.auth.bootstrap_admin.clone();

    let state = AppState::new(config, repository);

    if let Some(admin) = bootstrap_admin {
        state.services.users.ensure_admin(&admin).await?;
    }

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
