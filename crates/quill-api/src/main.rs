//! Quill API Server
//!
//! REST API server for the Quill blogging service.

use anyhow::Context;
use quill_api::{create_router, state::AppState};
use quill_core::{config::LoggingConfig, AppConfig, PgStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("QUILL_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    config.validate().context("invalid configuration")?;
    if config.server.development {
        tracing::warn!("development mode: signing secret checks are relaxed");
    }

    // Connect and migrate
    let store = PgStore::connect(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;

    let addr = config.server.bind_address();

    // Create application state
    let state = Arc::new(AppState::with_postgres(config, store)?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Quill API Server starting on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("quill_api={level},quill_core={level},tower_http=debug,audit=info").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
