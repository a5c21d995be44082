use super::types::{SessionId, SessionSummary, SpawnRequest};
use crate::error::{Error, Result};
use crate::process::ProcessGroup;
use crate::ring_buffer::RingBuffer;
use crate::subscriber::{SubscriberRegistry, Subscription};
use crate::SessionConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tether_protocol::{
    detector_for, LogLine, LogStream, Question, QuestionDetector, SessionStatus, StreamEvent,
};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::watch;
use tracing::debug;

struct SessionState {
    status: SessionStatus,
    /// Set once the process has exited and the terminal transition began.
    finalizing: bool,
    termination_reason: Option<String>,
    exit_code: Option<i32>,
    ended_at: Option<DateTime<Utc>>,
    last_activity_at: DateTime<Utc>,
    buffer: RingBuffer,
    subscribers: SubscriberRegistry,
    detector: Box<dyn QuestionDetector>,
    pending_question: Option<Question>,
    terminal: Option<StreamEvent>,
}

impl SessionState {
    fn accepts_control(&self) -> bool {
        !self.finalizing && !self.status.is_terminal()
    }

    fn emit_questions(&mut self, questions: Vec<Question>) {
        for question in questions {
            debug!(interaction_id = %question.interaction_id, kind = ?question.kind, "Question detected");
            self.subscribers
                .broadcast(&StreamEvent::Question(question.clone()));
            self.pending_question = Some(question);
        }
    }
}

/// One live or recently ended session
pub struct SessionHandle {
    id: SessionId,
    request: SpawnRequest,
    process_group: Option<ProcessGroup>,
    started_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    exited: watch::Sender<bool>,
    finished: watch::Sender<bool>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        request: SpawnRequest,
        process_group: Option<ProcessGroup>,
        stdin: Option<ChildStdin>,
        config: &SessionConfig,
    ) -> Self {
        let now = Utc::now();
        let detector = detector_for(request.mode);
        let (exited, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        Self {
            id,
            request,
            process_group,
            started_at: now,
            state: Mutex::new(SessionState {
                status: SessionStatus::Active,
                finalizing: false,
                termination_reason: None,
                exit_code: None,
                ended_at: None,
                last_activity_at: now,
                buffer: RingBuffer::new(config.ring_buffer_capacity),
                subscribers: SubscriberRegistry::new(config.mailbox_capacity),
                detector,
                pending_question: None,
                terminal: None,
            }),
            stdin: tokio::sync::Mutex::new(stdin),
            exited,
            finished,
        }
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// What was spawned
    #[must_use]
    pub fn request(&self) -> &SpawnRequest {
        &self.request
    }

    /// Process group of the session's process
    #[must_use]
    pub fn process_group(&self) -> Option<ProcessGroup> {
        self.process_group
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Whether the process is still running (not exited, not finalizing)
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.lock().accepts_control()
    }

    /// Spawn time
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Last output or control action
    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.state.lock().last_activity_at
    }

    /// End time once terminal
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ended_at
    }

    /// Append a Log Line and fan it out.
    ///
    /// Fails with [`Error::InvalidState`] once the terminal transition began.
    pub fn append(&self, stream: LogStream, content: impl Into<String>) -> Result<LogLine> {
        let mut state = self.state.lock();
        if state.finalizing || state.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "session {} has ended; output rejected",
                self.id
            )));
        }

        let line = state.buffer.push(stream, content);
        state.last_activity_at = line.timestamp;
        state
            .subscribers
            .broadcast(&StreamEvent::Output(line.clone()));

        if stream == LogStream::Stdout {
            let questions = state.detector.observe(&line.content);
            state.emit_questions(questions);
        }
        Ok(line)
    }

    /// Snapshot replay and register a live mailbox under one lock
    pub fn subscribe(self: &Arc<Self>, last_sequence: Option<u64>) -> Subscription {
        let mut state = self.state.lock();
        let replay = state.buffer.since(last_sequence);

        let mut events = VecDeque::with_capacity(replay.lines.len() + 3);
        if state.terminal.is_none() {
            events.push_back(StreamEvent::Status {
                state: state.status,
            });
        }
        if let Some(gap) = replay.gap {
            events.push_back(StreamEvent::Gap(gap));
        }
        events.extend(replay.lines.into_iter().map(StreamEvent::Output));

        if let Some(terminal) = state.terminal.clone() {
            events.push_back(StreamEvent::Status {
                state: state.status,
            });
            events.push_back(terminal);
            return Subscription::finished(self.id, events);
        }

        if let Some(question) = &state.pending_question {
            events.push_back(StreamEvent::Question(question.clone()));
        }
        let (subscriber_id, mailbox) = state.subscribers.register();
        let weak = Arc::downgrade(self);
        Subscription::live(
            self.id,
            events,
            mailbox,
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    handle.state.lock().subscribers.unregister(subscriber_id);
                }
            }),
        )
    }

    /// The most recent `n` Log Lines
    #[must_use]
    pub fn recent_output(&self, n: usize) -> Vec<LogLine> {
        self.state.lock().buffer.tail(n)
    }

    /// Point-in-time summary
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        let state = self.state.lock();
        SessionSummary {
            id: self.id,
            owner: self.request.owner.clone(),
            mode: self.request.mode,
            command: self.request.display_command(),
            working_directory: self.request.working_directory.clone(),
            status: state.status,
            process_group: self.process_group.map(|g| g.id()),
            exit_code: state.exit_code,
            started_at: self.started_at,
            ended_at: state.ended_at,
            last_activity_at: state.last_activity_at,
            buffered_lines: state.buffer.len(),
            latest_sequence: state.buffer.latest_sequence(),
            subscribers: state.subscribers.len(),
        }
    }

    /// Move between `active` and `paused`, signalling the group under the
    /// state lock so concurrent transitions serialize.
    pub(crate) fn transition(
        &self,
        from: SessionStatus,
        to: SessionStatus,
        signal: impl FnOnce(ProcessGroup) -> Result<bool>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.accepts_control() || state.status != from {
            return Err(Error::InvalidState(format!(
                "session {} is {}, expected {from}",
                self.id, state.status
            )));
        }
        let group = self.process_group.ok_or_else(|| {
            Error::InvalidState(format!("session {} has no process group", self.id))
        })?;
        if !signal(group)? {
            return Err(Error::InvalidState(format!(
                "process group {group} of session {} is gone",
                self.id
            )));
        }

        state.status = to;
        state.last_activity_at = Utc::now();
        state.subscribers.broadcast(&StreamEvent::Status { state: to });
        Ok(())
    }

    /// Write to the process's stdin
    pub(crate) async fn write_input(&self, text: &str) -> Result<()> {
        {
            let state = self.state.lock();
            if !state.accepts_control() || state.status != SessionStatus::Active {
                return Err(Error::InvalidState(format!(
                    "session {} is {}, input requires active",
                    self.id, state.status
                )));
            }
        }

        let mut payload = text.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }

        let mut stdin = self.stdin.lock().await;
        let pipe = stdin.as_mut().ok_or_else(|| {
            Error::InvalidState(format!("stdin of session {} is closed", self.id))
        })?;
        if let Err(e) = async {
            pipe.write_all(payload.as_bytes()).await?;
            pipe.flush().await
        }
        .await
        {
            *stdin = None;
            return Err(Error::InvalidState(format!(
                "stdin of session {} is closed: {e}",
                self.id
            )));
        }
        drop(stdin);

        let mut state = self.state.lock();
        state.last_activity_at = Utc::now();
        state.pending_question = None;
        Ok(())
    }

    /// Record why the process is being terminated.
    ///
    /// Returns `false` when the session already ended. The first reason wins.
    pub(crate) fn request_termination(&self, reason: &str) -> bool {
        let mut state = self.state.lock();
        if !state.accepts_control() {
            return false;
        }
        if state.termination_reason.is_none() {
            state.termination_reason = Some(reason.to_string());
        }
        true
    }

    /// Start the terminal transition: reject further output, flush question
    /// detection and take the termination reason.
    pub(crate) fn begin_finalize(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.finalizing = true;
        let questions = state.detector.flush();
        state.emit_questions(questions);
        state.termination_reason.take()
    }

    /// Broadcast the status and terminal events exactly once, then close
    /// every subscriber.
    pub(crate) fn complete(
        &self,
        status: SessionStatus,
        exit_code: Option<i32>,
        reason: Option<String>,
    ) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return None;
        }
        let now = Utc::now();
        let terminal = StreamEvent::terminal(status, exit_code, reason);

        state.status = status;
        state.exit_code = exit_code;
        state.ended_at = Some(now);
        state.last_activity_at = now;
        state.pending_question = None;
        state.subscribers.broadcast(&StreamEvent::Status { state: status });
        state.subscribers.close_with(&terminal);
        state.terminal = Some(terminal);
        Some(now)
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.send_replace(true);
    }

    pub(crate) async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    /// Resolves once the process has exited
    pub async fn wait_exited(&self) {
        let mut rx = self.exited.subscribe();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Resolves once the terminal event has been broadcast
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|finished| *finished).await;
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("command", &self.request.command)
            .field("process_group", &self.process_group)
            .field("status", &self.status())
            .finish()
    }
}
