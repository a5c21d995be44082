//! Server initialization and main run loop
//!
//! Contains the main `run()` function that starts all server components.

use super::background_tasks::start_sweeper;
use super::config::AppConfig;
use super::init_stores::init_store;
use super::loader::load_config;
use super::validation::validate_config;
use crate::api::{api_router, AppState};
use crate::middleware::ApiAuth;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{wait_for_shutdown_signal, SessionManager, SessionRegistry, ShutdownController};
use tracing::{info, warn};

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting Tether v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    validate_config(&config)?;
    serve(config).await
}

/// Run the server with an already-loaded configuration
async fn serve(config: AppConfig) -> Result<()> {
    let store = init_store(&config.store).await?;

    let registry = Arc::new(SessionRegistry::new());
    let manager = Arc::new(
        SessionManager::new(config.sessions.clone(), registry).with_store(store),
    );

    // Sessions left running by a previous process lost their pipes
    match manager.reconcile().await {
        Ok(report) if !report.reconciled.is_empty() => warn!(
            reconciled = report.reconciled.len(),
            surviving_groups = report.surviving_groups.len(),
            "Marked sessions from previous run as failed"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Crash recovery failed"),
    }

    let shutdown_controller = ShutdownController::new();
    let sweeper = start_sweeper(&config, &manager, &shutdown_controller);

    let state = AppState::new(Arc::clone(&manager), Arc::clone(&shutdown_controller))
        .with_keep_alive(config.server.keep_alive())
        .with_max_output_limit(config.server.max_output_limit);
    let auth = ApiAuth::new(config.server.auth.token.clone());
    if auth.is_enabled() {
        info!("Bearer token authentication enabled");
    }
    let app = api_router(state, auth);

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            Arc::clone(&shutdown_controller),
            Arc::clone(&manager),
        ))
        .await
        .context("HTTP server error")?;

    if tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .is_err()
    {
        warn!("Sweeper shutdown timeout");
    }

    info!("Tether shutdown complete");
    Ok(())
}

/// Resolve once every session has been stopped after Ctrl+C / SIGTERM.
///
/// Stopping sessions first ends their SSE responses with a terminal event,
/// which lets the graceful shutdown drain open streams.
async fn shutdown_signal(controller: Arc<ShutdownController>, manager: Arc<SessionManager>) {
    if let Err(e) = wait_for_shutdown_signal().await {
        warn!(error = %e, "Failed to install signal handlers; shutdown only on process exit");
        std::future::pending::<()>().await;
    }
    controller.shutdown(Some(manager.as_ref())).await;
}
