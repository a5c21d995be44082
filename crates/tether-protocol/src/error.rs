//! Error types for tether-protocol

use thiserror::Error;

/// Protocol error type
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event name is not part of the protocol
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    /// Frame carried no `data:` field
    #[error("frame for event '{0}' has no data")]
    MissingData(String),

    /// Event name and payload type disagree
    #[error("event name '{name}' does not match payload type '{payload}'")]
    KindMismatch {
        /// Name announced by the `event:` field
        name: String,
        /// Kind decoded from the payload
        payload: String,
    },

    /// A line or frame exceeded the decoder's size limit and was discarded
    #[error("frame exceeds {0} bytes")]
    FrameTooLarge(usize),

    /// Payload is not valid JSON for the announced event
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProtocolError>;
