//! Broadcast Protocol over Server-Sent Events
//!
//! GET /api/v1/sessions/:id/stream?lastSequence=k
//!
//! Replays buffered Log Lines after `k` (or after the `Last-Event-ID` header
//! when the query parameter is absent), then follows the session live. The
//! response ends after the terminal `complete` / `error` event.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tether_protocol::{Frame, StreamEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use super::response::ApiError;
use super::AppState;
use crate::middleware::RequireAuth;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub last_sequence: Option<u64>,
}

/// Resume point: query parameter first, then `Last-Event-ID`
fn resume_point(query: &StreamQuery, headers: &HeaderMap) -> Option<u64> {
    query.last_sequence.or_else(|| {
        headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Render one protocol event as an axum SSE event
fn to_sse_event(event: &StreamEvent) -> Option<Event> {
    match Frame::from_event(event) {
        Ok(frame) => {
            let sse = Event::default().event(frame.event).data(frame.data);
            Some(match frame.id {
                Some(id) => sse.id(id),
                None => sse,
            })
        }
        Err(e) => {
            warn!(error = %e, kind = %event.kind(), "Dropping unencodable event");
            None
        }
    }
}

async fn stream_session(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let last_sequence = resume_point(&query, &headers);
    let subscription = state.manager.subscribe(id, last_sequence)?;
    debug!(
        session_id = %id,
        ?last_sequence,
        replay = subscription.pending_replay(),
        "Stream subscriber attached"
    );

    let events = subscription
        .into_stream()
        .filter_map(|event| async move { to_sse_event(&event).map(Ok::<_, Infallible>) });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    ))
}

/// Create stream routes
pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/api/v1/sessions/:id/stream", get(stream_session))
}
