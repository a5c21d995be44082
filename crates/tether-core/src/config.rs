//! Session limits and timeouts

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of Log Lines kept per session
pub const DEFAULT_RING_BUFFER_CAPACITY: usize = 10_000;
/// Default per-subscriber mailbox size
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1_024;

/// Limits applied by the Session Manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Log Lines retained per session
    pub ring_buffer_capacity: usize,
    /// Events queued per subscriber before the oldest is dropped
    pub mailbox_capacity: usize,
    /// Evict sessions with no output or control activity for this long
    pub idle_timeout_secs: u64,
    /// Evict sessions running longer than this
    pub max_lifetime_secs: u64,
    /// Keep terminal sessions in memory this long after they end
    pub retention_secs: u64,
    /// Wait between SIGTERM and SIGKILL on stop
    pub stop_grace_secs: u64,
    /// How often the sweeper runs
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: DEFAULT_RING_BUFFER_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout_secs: 3600,
            max_lifetime_secs: 4 * 3600,
            retention_secs: 3600,
            stop_grace_secs: 5,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Set the ring buffer capacity
    #[must_use]
    pub fn with_ring_buffer_capacity(mut self, capacity: usize) -> Self {
        self.ring_buffer_capacity = capacity;
        self
    }

    /// Set the mailbox capacity
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Set the stop grace period
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_secs = grace.as_secs();
        self
    }

    /// Set idle timeout and maximum lifetime
    #[must_use]
    pub fn with_timeouts(mut self, idle: Duration, max_lifetime: Duration) -> Self {
        self.idle_timeout_secs = idle.as_secs();
        self.max_lifetime_secs = max_lifetime.as_secs();
        self
    }

    /// Set the retention period for ended sessions
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    /// Grace period as a [`Duration`]
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Sweep interval as a [`Duration`]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject zero capacities and timeouts
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("ring_buffer_capacity", self.ring_buffer_capacity as u64),
            ("mailbox_capacity", self.mailbox_capacity as u64),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("max_lifetime_secs", self.max_lifetime_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(Error::Configuration(format!(
                    "sessions.{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
