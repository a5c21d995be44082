//! Connection seam between the client and a stream source

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::collections::VecDeque;
use std::time::Duration;
use tether_protocol::{SseDecoder, StreamEvent};
use tracing::debug;
use uuid::Uuid;

/// Events from one connection; ends when the connection closes
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Three missed keep-alives at the server's default 15s interval
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Opens one connection to a session's stream
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect, resuming after `last_sequence` when given
    async fn connect(&self, session_id: Uuid, last_sequence: Option<u64>) -> Result<EventStream>;
}

/// Server-Sent Events over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    idle_timeout: Duration,
}

impl HttpTransport {
    /// Transport against a server such as `http://127.0.0.1:8090`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    /// Send `Authorization: Bearer <token>`
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Drop the connection when no bytes, keep-alives included, arrive
    /// for `timeout`
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Stream URL for a session
    #[must_use]
    pub fn stream_url(&self, session_id: Uuid, last_sequence: Option<u64>) -> String {
        let mut url = format!("{}/api/v1/sessions/{session_id}/stream", self.base_url);
        if let Some(seq) = last_sequence {
            url.push_str(&format!("?lastSequence={seq}"));
        }
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, session_id: Uuid, last_sequence: Option<u64>) -> Result<EventStream> {
        let url = self.stream_url(session_id, last_sequence);
        let mut request = self.client.get(&url).header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status.as_u16(), body));
        }
        debug!(%url, "Stream connected");

        Ok(decode_sse(response.bytes_stream(), self.idle_timeout))
    }
}

/// Decode an SSE byte stream into events.
///
/// Ends with a transport error when nothing arrives for `idle_timeout`, so
/// a half-open connection is noticed even though TCP never reports it.
pub fn decode_sse<S, B, E>(bytes: S, idle_timeout: Duration) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (
        bytes.boxed(),
        SseDecoder::new(),
        VecDeque::<Result<StreamEvent>>::new(),
        false,
    );
    futures::stream::unfold(
        state,
        move |(mut bytes, mut decoder, mut ready, mut stalled)| async move {
            loop {
                if let Some(item) = ready.pop_front() {
                    return Some((item, (bytes, decoder, ready, stalled)));
                }
                if stalled {
                    return None;
                }
                match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => ready.extend(
                        decoder
                            .push(chunk.as_ref())
                            .into_iter()
                            .map(|r| r.map_err(ClientError::from)),
                    ),
                    Ok(Some(Err(e))) => {
                        ready.push_back(Err(ClientError::Transport(e.to_string())));
                    }
                    Ok(None) => return None,
                    Err(_) => {
                        stalled = true;
                        ready.push_back(Err(ClientError::Transport(format!(
                            "no data for {}s",
                            idle_timeout.as_secs()
                        ))));
                    }
                }
            }
        },
    )
    .boxed()
}
