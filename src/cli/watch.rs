//! `tether watch`: print a session's stream
//!
//! Uses the reconnecting Streaming Client, so a dropped connection resumes
//! after the last printed Log Line.

use super::ServerArgs;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tether_client::{ClientState, HttpTransport, StreamingClient};
use tether_protocol::{LogStream, StreamEvent};
use tracing::{info, warn};
use uuid::Uuid;

/// Where a rendered event goes
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Stdout(String),
    Stderr(String),
}

/// Render one event for a terminal
pub fn render(event: &StreamEvent) -> Line {
    match event {
        StreamEvent::Output(line) => match line.stream {
            LogStream::Stdout => Line::Stdout(line.content.clone()),
            LogStream::Stderr => Line::Stderr(line.content.clone()),
        },
        StreamEvent::Question(question) => {
            let mut text = format!("[question {}] {}", question.interaction_id, question.prompt);
            if let Some(options) = &question.options {
                text.push_str(&format!(" ({})", options.join(" / ")));
            }
            Line::Stderr(text)
        }
        StreamEvent::Status { state } => Line::Stderr(format!("[status] {state}")),
        StreamEvent::Gap(gap) => Line::Stderr(format!(
            "[gap] lines {}..{} are no longer buffered",
            gap.requested + 1,
            gap.oldest_available
        )),
        StreamEvent::Complete { exit_code } => Line::Stderr(match exit_code {
            Some(code) => format!("[complete] exit code {code}"),
            None => "[complete]".to_string(),
        }),
        StreamEvent::Error { message } => Line::Stderr(format!("[error] {message}")),
    }
}

fn print(event: &StreamEvent) {
    match render(event) {
        Line::Stdout(text) => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{text}");
        }
        Line::Stderr(text) => {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{text}");
        }
    }
}

/// Follow a session until its terminal event
pub async fn run(server: &ServerArgs, session_id: Uuid, last_sequence: Option<u64>) -> Result<()> {
    let mut transport =
        HttpTransport::new(server.server.clone()).context("Failed to build HTTP client")?;
    if let Some(token) = &server.token {
        transport = transport.with_token(token.clone());
    }

    let client = StreamingClient::new(Arc::new(transport));
    let terminal: Arc<Mutex<Option<StreamEvent>>> = Arc::default();
    let seen = Arc::clone(&terminal);
    client.on_any(move |event| {
        print(event);
        if event.is_terminal() {
            *seen.lock() = Some(event.clone());
        }
    });
    client.on_overflow(|dropped_total| {
        warn!(dropped_total, "Output arrived faster than it could be printed")
    });

    info!(%session_id, server = %server.server, "Watching session");
    let mut state = client.watch_state();
    client.connect_from(session_id, last_sequence);
    let drain = client.spawn_drain_loop();

    let final_state = tokio::select! {
        changed = state.wait_for(|s| matches!(s, ClientState::Closed | ClientState::GaveUp { .. })) => {
            changed.map(|s| s.clone()).context("Client stopped unexpectedly")?
        }
        _ = tokio::signal::ctrl_c() => {
            client.close();
            drain.abort();
            return Ok(());
        }
    };

    // Flush whatever the drain loop has not printed yet
    drain.abort();
    while client.tick() > 0 {}
    client.close();

    if let ClientState::GaveUp { reason } = final_state {
        bail!("Lost connection to {}: {reason}", server.server);
    }
    let outcome = terminal.lock().take();
    match outcome {
        Some(StreamEvent::Error { message }) => bail!("Session failed: {message}"),
        _ => Ok(()),
    }
}
