//! Error types for tether-client

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection failed or dropped; worth retrying
    #[error("transport error: {0}")]
    Transport(String),

    /// The server refused the stream for good (auth, unknown session)
    #[error("server refused stream with status {status}: {message}")]
    Fatal {
        /// HTTP status
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// A frame could not be decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] tether_protocol::ProtocolError),

    /// HTTP client error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether reconnecting cannot help
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Classify an HTTP status that refused the stream
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if matches!(status, 401 | 403 | 404 | 410) {
            Self::Fatal { status, message }
        } else {
            Self::Transport(format!("status {status}: {message}"))
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;
