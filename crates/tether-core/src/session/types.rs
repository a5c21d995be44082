use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tether_protocol::{ExecutionMode, SessionStatus};
use uuid::Uuid;

/// Session identifier
pub type SessionId = Uuid;

/// What to run for a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Executable name or path
    pub command: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory the process starts in
    pub working_directory: PathBuf,
    /// Output dialect
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Who triggered the execution
    #[serde(default)]
    pub owner: Option<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl SpawnRequest {
    /// Run `command` in `working_directory`
    #[must_use]
    pub fn new(command: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_directory: working_directory.into(),
            mode: ExecutionMode::default(),
            owner: None,
            env: HashMap::new(),
        }
    }

    /// Set arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the execution mode
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the owner
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line for logs
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub id: SessionId,
    /// Who triggered the execution
    pub owner: Option<String>,
    /// Output dialect
    pub mode: ExecutionMode,
    /// Command line
    pub command: String,
    /// Working directory
    pub working_directory: PathBuf,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Process group id
    pub process_group: Option<i32>,
    /// Exit code once ended
    pub exit_code: Option<i32>,
    /// Spawn time
    pub started_at: DateTime<Utc>,
    /// End time
    pub ended_at: Option<DateTime<Utc>>,
    /// Last output or control action
    pub last_activity_at: DateTime<Utc>,
    /// Lines currently held by the ring buffer
    pub buffered_lines: usize,
    /// Sequence of the last Log Line
    pub latest_sequence: u64,
    /// Live subscribers
    pub subscribers: usize,
}
