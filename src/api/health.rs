//! Health check endpoint
//!
//! `/health` reports liveness, the shutdown phase and session counts. It is
//! not behind authentication so load balancers can probe it.

use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use tether_protocol::SessionStatus;

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub sessions: SessionCounts,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCounts {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut counts = SessionCounts::default();
    for summary in state.manager.list() {
        counts.total += 1;
        match summary.status {
            SessionStatus::Active => counts.active += 1,
            SessionStatus::Paused => counts.paused += 1,
            SessionStatus::Completed => counts.completed += 1,
            SessionStatus::Failed => counts.failed += 1,
        }
    }

    let status = if state.shutdown.is_accepting_work() {
        "healthy"
    } else {
        "shutting_down"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.manager.store().name().to_string(),
        sessions: counts,
    })
}

/// Create health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
