//! Idle/lifetime eviction and release of ended sessions

use super::manager::SessionManager;
use super::types::SessionId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Terminated for inactivity
    pub idle: Vec<SessionId>,
    /// Terminated for running too long
    pub expired: Vec<SessionId>,
    /// Ended sessions dropped from the registry
    pub released: Vec<SessionId>,
}

impl SweepReport {
    /// Whether the sweep changed nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idle.is_empty() && self.expired.is_empty() && self.released.is_empty()
    }
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::from_std(Duration::from_secs(value)).unwrap_or(chrono::Duration::MAX)
}

impl SessionManager {
    /// Evict idle or overlong sessions and release ended ones, as of `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let config = self.config();
        let idle_timeout = secs(config.idle_timeout_secs);
        let max_lifetime = secs(config.max_lifetime_secs);
        let retention = secs(config.retention_secs);

        let mut report = SweepReport::default();
        let mut evictions = Vec::new();

        for handle in self.registry().all() {
            if let Some(ended_at) = handle.ended_at() {
                if now - ended_at >= retention {
                    self.registry().remove(handle.id());
                    report.released.push(handle.id());
                }
                continue;
            }
            if !handle.is_live() {
                continue;
            }
            if now - handle.last_activity_at() >= idle_timeout {
                report.idle.push(handle.id());
                evictions.push((handle, "idle timeout"));
            } else if now - handle.started_at() >= max_lifetime {
                report.expired.push(handle.id());
                evictions.push((handle, "lifetime exceeded"));
            }
        }

        let results = futures::future::join_all(
            evictions
                .iter()
                .map(|(handle, reason)| self.terminate(handle, reason)),
        )
        .await;
        for ((handle, reason), result) in evictions.iter().zip(results) {
            match result {
                Ok(()) => info!(session_id = %handle.id(), reason, "Session evicted"),
                Err(e) => warn!(session_id = %handle.id(), reason, error = %e, "Eviction failed"),
            }
        }

        if !report.released.is_empty() {
            debug!(released = report.released.len(), "Released ended sessions");
        }
        report
    }
}

/// Run [`SessionManager::sweep`] every `interval` until `shutdown` fires
pub fn spawn_sweeper(
    manager: Arc<SessionManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Session sweeper started");
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = manager.sweep(Utc::now()).await;
                    if !report.is_empty() {
                        info!(
                            idle = report.idle.len(),
                            expired = report.expired.len(),
                            released = report.released.len(),
                            "Sweep finished"
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    break;
                }
            }
        }
    })
}
