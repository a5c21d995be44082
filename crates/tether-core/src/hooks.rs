//! Collaborator callbacks

use async_trait::async_trait;
use uuid::Uuid;

/// Invoked once per session when its process ends.
///
/// The manager awaits the hook before the terminal event is broadcast, so
/// anything the hook records is visible to observers who see the session
/// end.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalHook: Send + Sync {
    /// Called with the exit code (`None` when killed by a signal)
    async fn on_terminal(&self, session_id: Uuid, exit_code: Option<i32>);
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl TerminalHook for NoopHook {
    async fn on_terminal(&self, _session_id: Uuid, _exit_code: Option<i32>) {}
}
