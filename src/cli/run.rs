//! `tether run`: spawn a command through the API, then watch it

use super::ServerArgs;
use crate::api::sessions::{CreateSessionRequest, CreateSessionResponse};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tether_protocol::ExecutionMode;
use tracing::info;
use uuid::Uuid;

/// Response envelope as seen by a client
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn build_request(
    mode: ExecutionMode,
    cwd: Option<PathBuf>,
    mut command: Vec<String>,
) -> Result<CreateSessionRequest> {
    if command.is_empty() {
        return Err(anyhow!("No command given"));
    }
    let program = command.remove(0);
    let working_directory = match cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot resolve current directory")?,
    };
    Ok(CreateSessionRequest {
        command: program,
        args: command,
        working_directory: Some(working_directory),
        mode,
        owner: std::env::var("USER").ok(),
        env: HashMap::new(),
    })
}

async fn create_session(server: &ServerArgs, request: &CreateSessionRequest) -> Result<Uuid> {
    let url = format!("{}/api/v1/sessions", server.server.trim_end_matches('/'));
    let mut http = reqwest::Client::new().post(&url).json(request);
    if let Some(token) = &server.token {
        http = http.bearer_auth(token);
    }

    let response = http
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;
    let status = response.status();
    let envelope: Envelope<CreateSessionResponse> = response
        .json()
        .await
        .with_context(|| format!("Unexpected response from {url} ({status})"))?;

    match envelope.data {
        Some(created) if status.is_success() => Ok(created.session_id),
        _ => Err(anyhow!(
            "Server refused to spawn ({status}, {}): {}",
            envelope.code.as_deref().unwrap_or("UNKNOWN"),
            envelope.error.unwrap_or_default()
        )),
    }
}

/// Spawn `command` and stream it until it ends
pub async fn run(
    server: &ServerArgs,
    mode: ExecutionMode,
    cwd: Option<PathBuf>,
    command: Vec<String>,
) -> Result<()> {
    let request = build_request(mode, cwd, command)?;
    let session_id = create_session(server, &request).await?;
    info!(%session_id, "Session started");
    eprintln!("session {session_id}");

    super::watch::run(server, session_id, None).await
}
