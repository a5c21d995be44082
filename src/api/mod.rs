//! Web API module for Tether
//!
//! Provides REST and streaming endpoints for:
//! - Session lifecycle (spawn, stop, pause, resume, input)
//! - Live output over Server-Sent Events with replay
//! - Health checks

pub mod health;
pub mod response;
pub mod sessions;
pub mod stream;

#[cfg(test)]
mod tests;

use axum::{Extension, Router};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{SessionManager, ShutdownController};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::ApiAuth;

pub use health::health_routes;
pub use sessions::sessions_routes;
pub use stream::stream_routes;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub shutdown: Arc<ShutdownController>,
    pub keep_alive: Duration,
    pub max_output_limit: usize,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, shutdown: Arc<ShutdownController>) -> Self {
        Self {
            manager,
            shutdown,
            keep_alive: Duration::from_secs(15),
            max_output_limit: 1000,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_max_output_limit(mut self, limit: usize) -> Self {
        self.max_output_limit = limit;
        self
    }
}

/// Create the full application router
pub fn api_router(state: AppState, auth: ApiAuth) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(sessions_routes())
        .merge(stream_routes())
        .with_state(state)
        .layer(Extension(Arc::new(auth)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
