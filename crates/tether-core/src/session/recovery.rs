//! Crash recovery for sessions persisted by a previous server process

use super::manager::SessionManager;
use crate::error::Result;
use crate::process::{GroupProbe, ProcessGroup};
use chrono::Utc;
use tether_protocol::SessionStatus;
use tether_store::SessionStore;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records marked `failed`
    pub reconciled: Vec<Uuid>,
    /// Persisted process group ids that still have members. They are never
    /// signalled: after a restart the id may belong to an unrelated group.
    pub surviving_groups: Vec<i32>,
}

/// Mark every session the store still believes is running as `failed`.
///
/// Sessions in `skip` belong to this process and are left alone. No signal
/// is sent: a stored group id cannot be told apart from a recycled one, so
/// groups that still exist are only reported.
pub async fn reconcile(
    store: &dyn SessionStore,
    probe: &dyn GroupProbe,
    skip: &[Uuid],
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let now = Utc::now();

    for record in store.active_sessions().await? {
        if skip.contains(&record.id) {
            continue;
        }

        if let Some(pgid) = record.process_group {
            let group = ProcessGroup::from_raw(pgid);
            if probe.exists(group) {
                warn!(
                    session_id = %record.id,
                    pgid,
                    "Process group id is in use; leaving it untouched"
                );
                report.surviving_groups.push(pgid);
            }
        }

        store
            .record_status(record.id, SessionStatus::Failed, now)
            .await?;
        report.reconciled.push(record.id);
    }

    if !report.reconciled.is_empty() {
        info!(
            reconciled = report.reconciled.len(),
            surviving_groups = report.surviving_groups.len(),
            "Reconciled sessions from previous run"
        );
    }
    Ok(report)
}

impl SessionManager {
    /// [`reconcile`] this manager's store, skipping sessions it owns
    pub async fn reconcile(&self) -> Result<RecoveryReport> {
        let own: Vec<Uuid> = self.registry().all().iter().map(|h| h.id()).collect();
        reconcile(self.store.as_ref(), self.probe.as_ref(), &own).await
    }
}
