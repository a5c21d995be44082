//! Error types for tether-core

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The external process could not be started
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// Executable that was requested
        command: String,
        /// Underlying reason
        message: String,
    },

    /// No session with this id in the registry
    #[error("session not found: {0}")]
    NotFound(Uuid),

    /// The operation is not valid in the session's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Signal delivery to a process group failed
    #[error("process control error: {0}")]
    Process(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// I/O error (stdin writes, pipes)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence error
    #[error("store error: {0}")]
    Store(#[from] tether_store::Error),
}

impl Error {
    /// Machine-readable error code used by the HTTP layer
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Process(_) => "PROCESS_CONTROL",
            Self::Configuration(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
