//! Sessions API endpoints
//!
//! POST   /api/v1/sessions              - Spawn a session
//! GET    /api/v1/sessions              - List sessions
//! GET    /api/v1/sessions/:id          - Get session details
//! GET    /api/v1/sessions/:id/output   - Recent Log Lines (`?limit=n`)
//! POST   /api/v1/sessions/:id/stop     - Stop the process group
//! POST   /api/v1/sessions/:id/pause    - Suspend the process group
//! POST   /api/v1/sessions/:id/resume   - Continue the process group
//! POST   /api/v1/sessions/:id/input    - Write a line to stdin

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tether_core::{SessionSummary, SpawnRequest};
use tether_protocol::{ExecutionMode, LogLine};
use tracing::info;
use uuid::Uuid;

use super::response::{ApiError, ApiResponse, ApiResult};
use super::AppState;
use crate::middleware::RequireAuth;

const DEFAULT_OUTPUT_LIMIT: usize = 100;

/// Request to spawn a session
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the server's working directory
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CreateSessionRequest {
    fn into_spawn_request(self) -> Result<SpawnRequest, ApiError> {
        let working_directory = match self.working_directory {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| {
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    format!("cannot resolve working directory: {e}"),
                )
            })?,
        };

        let mut request = SpawnRequest::new(self.command, working_directory)
            .with_args(self.args)
            .with_mode(self.mode);
        if let Some(owner) = self.owner {
            request = request.with_owner(owner);
        }
        for (key, value) in self.env {
            request = request.with_env(key, value);
        }
        Ok(request)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendInputRequest {
    pub text: String,
}

/// Spawn a new session
async fn create_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateSessionResponse>>), ApiError> {
    if !state.shutdown.is_accepting_work() {
        return Err(ApiError::unavailable("server is shutting down"));
    }
    if request.command.trim().is_empty() {
        return Err(ApiError::bad_request("command must not be empty"));
    }

    let spawn = request.into_spawn_request()?;
    let command = spawn.display_command();
    let session_id = state.manager.create(spawn).await?;
    info!(%session_id, %command, "Session created via API");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateSessionResponse { session_id })),
    ))
}

/// List every session still held in memory
async fn list_sessions(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(ApiResponse::success(state.manager.list())))
}

async fn get_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSummary> {
    Ok(Json(ApiResponse::success(state.manager.get(id)?)))
}

/// Most recent Log Lines, oldest first
async fn recent_output(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OutputQuery>,
) -> ApiResult<Vec<LogLine>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_OUTPUT_LIMIT)
        .min(state.max_output_limit);
    Ok(Json(ApiResponse::success(
        state.manager.recent_output(id, limit)?,
    )))
}

async fn stop_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSummary> {
    state.manager.stop(id).await?;
    Ok(Json(ApiResponse::success(state.manager.get(id)?)))
}

async fn pause_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSummary> {
    state.manager.pause(id).await?;
    Ok(Json(ApiResponse::success(state.manager.get(id)?)))
}

async fn resume_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSummary> {
    state.manager.resume(id).await?;
    Ok(Json(ApiResponse::success(state.manager.get(id)?)))
}

async fn send_input(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendInputRequest>,
) -> ApiResult<()> {
    state.manager.send_input(id, &request.text).await?;
    Ok(Json(ApiResponse::success(())))
}

/// Create sessions routes
pub fn sessions_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/sessions",
            get(list_sessions).post(create_session),
        )
        .route("/api/v1/sessions/:id", get(get_session))
        .route("/api/v1/sessions/:id/output", get(recent_output))
        .route("/api/v1/sessions/:id/stop", post(stop_session))
        .route("/api/v1/sessions/:id/pause", post(pause_session))
        .route("/api/v1/sessions/:id/resume", post(resume_session))
        .route("/api/v1/sessions/:id/input", post(send_input))
}
