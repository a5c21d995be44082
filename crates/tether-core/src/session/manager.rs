use super::handle::SessionHandle;
use super::reader::spawn_reader;
use super::registry::SessionRegistry;
use super::types::{SessionId, SessionSummary, SpawnRequest};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::hooks::{NoopHook, TerminalHook};
use crate::process::{GroupProbe, ProcessGroup, SignalProbe};
use crate::subscriber::Subscription;
use chrono::Utc;
use std::process::Stdio;
use std::sync::Arc;
use tether_protocol::{LogLine, LogStream, SessionStatus};
use tether_store::{MemorySessionStore, SessionRecord, SessionStore};
use tokio::process::Command;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Spawns external processes and streams their output to subscribers
pub struct SessionManager {
    config: SessionConfig,
    registry: Arc<SessionRegistry>,
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) hook: Arc<dyn TerminalHook>,
    pub(super) probe: Arc<dyn GroupProbe>,
}

impl SessionManager {
    /// Create a manager over `registry` with an in-memory store and no hook
    #[must_use]
    pub fn new(config: SessionConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            registry,
            store: Arc::new(MemorySessionStore::new()),
            hook: Arc::new(NoopHook),
            probe: Arc::new(SignalProbe),
        }
    }

    /// Persist session records in `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Invoke `hook` when a session's process ends
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn TerminalHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Use `probe` to check persisted process groups during recovery
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn GroupProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Active limits
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session arena
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Session store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub(super) fn handle(&self, id: SessionId) -> Result<Arc<SessionHandle>> {
        self.registry.get(id).ok_or(Error::NotFound(id))
    }

    /// Spawn a process in its own process group and start streaming it
    #[instrument(skip(self, request), fields(command = %request.command))]
    pub async fn create(&self, request: SpawnRequest) -> Result<SessionId> {
        if request.command.trim().is_empty() {
            return Err(Error::Spawn {
                command: request.command.clone(),
                message: "command is empty".to_string(),
            });
        }
        if !request.working_directory.is_dir() {
            return Err(Error::Spawn {
                command: request.command.clone(),
                message: format!(
                    "working directory {} does not exist",
                    request.working_directory.display()
                ),
            });
        }

        let mut child = Command::new(&request.command)
            .args(&request.args)
            .current_dir(&request.working_directory)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn {
                command: request.command.clone(),
                message: e.to_string(),
            })?;

        let id = Uuid::new_v4();
        let group = child
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .map(ProcessGroup::from_raw);
        let stdin = child.stdin.take();
        let handle = Arc::new(SessionHandle::new(
            id,
            request,
            group,
            stdin,
            &self.config,
        ));

        if let Err(e) = self.registry.insert(Arc::clone(&handle)) {
            if let Some(group) = group {
                let _ = group.kill();
            }
            return Err(e);
        }

        let record = SessionRecord::started(
            id,
            handle.request().owner.clone(),
            group.map(|g| g.id()),
        );
        if let Err(e) = self.store.record_started(&record).await {
            warn!(session_id = %id, error = %e, "Failed to persist session record");
        }

        spawn_reader(
            Arc::clone(&handle),
            child,
            Arc::clone(&self.hook),
            Arc::clone(&self.store),
        );

        info!(
            session_id = %id,
            pgid = ?group.map(|g| g.id()),
            mode = %handle.request().mode,
            command = %handle.request().display_command(),
            "Session started"
        );
        Ok(id)
    }

    /// Terminate a session's process group: SIGTERM, then SIGKILL after the
    /// grace period. Succeeds silently for sessions that already ended.
    pub async fn stop(&self, id: SessionId) -> Result<()> {
        let handle = self.handle(id)?;
        self.terminate(&handle, "stopped by request").await
    }

    pub(super) async fn terminate(&self, handle: &SessionHandle, reason: &str) -> Result<()> {
        if !handle.request_termination(reason) {
            return Ok(());
        }
        let grace = self.config.stop_grace();

        if let Some(group) = handle.process_group() {
            info!(session_id = %handle.id(), pgid = group.id(), reason, "Terminating session");
            group.terminate()?;
            // A stopped group cannot act on SIGTERM
            group.resume()?;

            if tokio::time::timeout(grace, handle.wait_exited()).await.is_err() {
                warn!(
                    session_id = %handle.id(),
                    pgid = group.id(),
                    grace_secs = grace.as_secs(),
                    "Process ignored SIGTERM, sending SIGKILL"
                );
                group.kill()?;
            }
        }

        if tokio::time::timeout(grace.max(std::time::Duration::from_secs(1)), handle.wait_finished())
            .await
            .is_err()
        {
            warn!(session_id = %handle.id(), "Session did not finish after termination");
        }
        Ok(())
    }

    /// Suspend the process group
    pub async fn pause(&self, id: SessionId) -> Result<()> {
        let handle = self.handle(id)?;
        handle.transition(SessionStatus::Active, SessionStatus::Paused, |g| {
            g.suspend()
        })?;
        self.persist_status(id, SessionStatus::Paused).await;
        info!(session_id = %id, "Session paused");
        Ok(())
    }

    /// Continue a paused process group
    pub async fn resume(&self, id: SessionId) -> Result<()> {
        let handle = self.handle(id)?;
        handle.transition(SessionStatus::Paused, SessionStatus::Active, |g| {
            g.resume()
        })?;
        self.persist_status(id, SessionStatus::Active).await;
        info!(session_id = %id, "Session resumed");
        Ok(())
    }

    /// Write a line to the process's stdin
    pub async fn send_input(&self, id: SessionId, text: &str) -> Result<()> {
        let handle = self.handle(id)?;
        handle.write_input(text).await
    }

    /// Append a Log Line to a session and fan it out
    pub fn append_log(
        &self,
        id: SessionId,
        stream: LogStream,
        content: impl Into<String>,
    ) -> Result<LogLine> {
        self.handle(id)?.append(stream, content)
    }

    /// Replay buffered history after `last_sequence`, then live events
    pub fn subscribe(&self, id: SessionId, last_sequence: Option<u64>) -> Result<Subscription> {
        Ok(self.handle(id)?.subscribe(last_sequence))
    }

    /// The most recent `n` Log Lines
    pub fn recent_output(&self, id: SessionId, n: usize) -> Result<Vec<LogLine>> {
        Ok(self.handle(id)?.recent_output(n))
    }

    /// Summary of one session
    pub fn get(&self, id: SessionId) -> Result<SessionSummary> {
        Ok(self.handle(id)?.summary())
    }

    /// Summaries of every session in the registry, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<_> = self.registry.all().iter().map(|h| h.summary()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Stop every live session concurrently
    pub async fn shutdown(&self) {
        let live: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .filter(|h| h.is_live())
            .collect();
        if live.is_empty() {
            return;
        }
        info!(sessions = live.len(), "Stopping live sessions");
        let results = futures::future::join_all(
            live.iter()
                .map(|handle| self.terminate(handle, "server shutting down")),
        )
        .await;
        for (handle, result) in live.iter().zip(results) {
            if let Err(e) = result {
                warn!(session_id = %handle.id(), error = %e, "Failed to stop session");
            }
        }
    }

    async fn persist_status(&self, id: SessionId, status: SessionStatus) {
        if let Err(e) = self.store.record_status(id, status, Utc::now()).await {
            warn!(session_id = %id, status = %status, error = %e, "Failed to persist status");
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("store", &self.store.name())
            .finish()
    }
}
