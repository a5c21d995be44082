//! Background task startup functions

use super::config::AppConfig;
use std::sync::Arc;
use tether_core::{spawn_sweeper, SessionManager, ShutdownController};
use tokio::task::JoinHandle;

/// Start the idle/lifetime sweeper; stops when the controller cancels its token
pub fn start_sweeper(
    config: &AppConfig,
    manager: &Arc<SessionManager>,
    shutdown_controller: &ShutdownController,
) -> JoinHandle<()> {
    spawn_sweeper(
        Arc::clone(manager),
        config.sessions.sweep_interval(),
        shutdown_controller.token(),
    )
}
