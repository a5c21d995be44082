//! Process-group control
//!
//! Every session's process is spawned as the leader of its own process
//! group, so signals reach the whole tree it may have forked.

use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// A process group addressed by its id (the leader's pid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup(i32);

impl ProcessGroup {
    /// Wrap a raw process group id
    #[must_use]
    pub fn from_raw(pgid: i32) -> Self {
        Self(pgid)
    }

    /// Raw process group id
    #[must_use]
    pub fn id(&self) -> i32 {
        self.0
    }

    /// SIGTERM the group
    pub fn terminate(&self) -> Result<bool> {
        self.signal(Signal::SIGTERM)
    }

    /// SIGKILL the group
    pub fn kill(&self) -> Result<bool> {
        self.signal(Signal::SIGKILL)
    }

    /// SIGSTOP the group
    pub fn suspend(&self) -> Result<bool> {
        self.signal(Signal::SIGSTOP)
    }

    /// SIGCONT the group
    pub fn resume(&self) -> Result<bool> {
        self.signal(Signal::SIGCONT)
    }

    /// Deliver a signal to every member of the group.
    ///
    /// Returns `Ok(false)` when the group no longer exists.
    pub fn signal(&self, signal: Signal) -> Result<bool> {
        if self.0 <= 1 {
            return Err(Error::Process(format!(
                "refusing to signal process group {}",
                self.0
            )));
        }
        match killpg(Pid::from_raw(self.0), signal) {
            Ok(()) => {
                debug!(pgid = self.0, signal = %signal, "Signalled process group");
                Ok(true)
            }
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(Error::Process(format!(
                "{signal} to process group {}: {e}",
                self.0
            ))),
        }
    }

    /// Whether any process is still a member of the group
    #[must_use]
    pub fn exists(&self) -> bool {
        if self.0 <= 1 {
            return false;
        }
        // EPERM still proves the group exists
        !matches!(killpg(Pid::from_raw(self.0), None), Err(Errno::ESRCH))
    }
}

impl std::fmt::Display for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness check for persisted process groups
pub trait GroupProbe: Send + Sync {
    /// Whether the group still has members
    fn exists(&self, group: ProcessGroup) -> bool;
}

/// [`GroupProbe`] backed by real signals
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl GroupProbe for SignalProbe {
    fn exists(&self, group: ProcessGroup) -> bool {
        group.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    #[test]
    fn test_refuses_init_and_zero() {
        assert!(ProcessGroup::from_raw(0).terminate().is_err());
        assert!(ProcessGroup::from_raw(1).kill().is_err());
        assert!(!ProcessGroup::from_raw(0).exists());
    }

    #[test]
    fn test_kill_group() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let group = ProcessGroup::from_raw(child.id() as i32);
        assert!(group.exists());

        assert!(group.kill().unwrap());
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!group.exists());
        assert!(!group.terminate().unwrap());
    }
}
