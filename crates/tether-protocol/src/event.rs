//! Event types for the Broadcast Protocol
//!
//! Every frame on the wire carries one [`StreamEvent`]. The payload is
//! self-describing (`"type"` tag) and the SSE `event:` name always equals
//! [`StreamEvent::kind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output stream a Log Line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl LogStream {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of process output.
///
/// `sequence` is assigned by the session's ring buffer: it starts at 1, is
/// strictly increasing per session and is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Per-session sequence number
    pub sequence: u64,
    /// Stream the line came from
    pub stream: LogStream,
    /// Line content without the trailing newline
    pub content: String,
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Process is running
    Active,
    /// Process is suspended
    Paused,
    /// Process exited with code 0
    Completed,
    /// Process failed, was stopped, or was evicted
    Failed,
}

impl SessionStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states are absorbing
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

/// How the external process communicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Line-delimited JSON records (structured agent output)
    #[default]
    Batch,
    /// Free-form terminal text
    Interactive,
}

impl ExecutionMode {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Interactive => "interactive",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Self::Batch),
            "interactive" => Ok(Self::Interactive),
            _ => Err(format!("unknown execution mode: {s}")),
        }
    }
}

/// Shape of the input a question expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Pick one of `options`
    Choice,
    /// Yes/no confirmation
    Confirm,
    /// Free text answer
    Text,
}

/// A structured input request detected in process output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier the answer should reference
    pub interaction_id: String,
    /// Expected answer shape
    pub kind: QuestionKind,
    /// Prompt shown to the user
    pub prompt: String,
    /// Options for `choice` / `confirm` questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Question {
    /// Create a question with a fresh interaction id
    #[must_use]
    pub fn new(kind: QuestionKind, prompt: impl Into<String>) -> Self {
        Self {
            interaction_id: Uuid::new_v4().to_string(),
            kind,
            prompt: prompt.into(),
            options: None,
        }
    }

    /// Attach answer options
    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Override the interaction id
    #[must_use]
    pub fn with_interaction_id(mut self, id: impl Into<String>) -> Self {
        self.interaction_id = id.into();
        self
    }
}

/// Replay could not start at the requested position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// `lastSequence` the client asked to resume after
    pub requested: u64,
    /// Oldest sequence still held by the ring buffer
    pub oldest_available: u64,
}

/// Event name, used as the SSE `event:` field and as the listener key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Log Line
    Output,
    /// Structured input request
    Question,
    /// Lifecycle transition
    Status,
    /// Terminal: process exited
    Complete,
    /// Terminal: process failed or was stopped
    Error,
    /// History truncated before replay
    Gap,
}

impl EventKind {
    /// All event kinds, in protocol order
    pub const ALL: [EventKind; 6] = [
        Self::Output,
        Self::Question,
        Self::Status,
        Self::Complete,
        Self::Error,
        Self::Gap,
    ];

    /// Returns the wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Question => "question",
            Self::Status => "status",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Gap => "gap",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

/// A Broadcast Protocol event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// One Log Line
    Output(LogLine),
    /// The process is waiting for structured input
    Question(Question),
    /// Lifecycle transition
    Status {
        /// New status
        state: SessionStatus,
    },
    /// The process exited; terminal
    Complete {
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
    },
    /// The session failed; terminal
    Error {
        /// Human-readable reason
        message: String,
    },
    /// Requested history is no longer buffered
    Gap(Gap),
}

impl StreamEvent {
    /// Event name for this variant
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Output(_) => EventKind::Output,
            Self::Question(_) => EventKind::Question,
            Self::Status { .. } => EventKind::Status,
            Self::Complete { .. } => EventKind::Complete,
            Self::Error { .. } => EventKind::Error,
            Self::Gap(_) => EventKind::Gap,
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Sequence number for `output` events
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Output(line) => Some(line.sequence),
            _ => None,
        }
    }

    /// Build the terminal event for an exit
    #[must_use]
    pub fn terminal(status: SessionStatus, exit_code: Option<i32>, message: Option<String>) -> Self {
        match (status, message) {
            (SessionStatus::Completed, _) => Self::Complete { exit_code },
            (_, Some(message)) => Self::Error { message },
            (_, None) => Self::Error {
                message: match exit_code {
                    Some(code) => format!("process exited with code {code}"),
                    None => "process terminated by signal".to_string(),
                },
            },
        }
    }
}
