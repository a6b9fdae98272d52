//! testboard server
//!
//! Loads configuration from the environment (`.env` supported), opens the
//! SQLite database, runs migrations and serves the REST API.
//!
//! Usage:
//!   cargo run --bin seed_data -- --username admin --password secret   # create a login
//!   JWT_SECRET=... cargo run --bin testboard                           # start server

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use testboard::config::Config;
use testboard::logging;
use testboard::rest::{create_router, AppState};
use testboard::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let _log_guard = logging::init(config.log_format, config.log_dir.as_deref());

    info!(
        addr = %config.bind_addr,
        environment = ?config.environment,
        token_ttl_secs = config.token_ttl.as_secs(),
        "testboard starting"
    );

    let storage = Storage::open(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let state = Arc::new(
        AppState::from_config(&config, storage.clone()).context("failed to prepare password verifier")?,
    );
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.close().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
