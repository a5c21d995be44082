//! Persisted session record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_protocol::SessionStatus;
use uuid::Uuid;

/// What survives a server restart about one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier
    pub id: Uuid,
    /// Owning entity (project, job, ...) as given by the caller
    pub owner: Option<String>,
    /// Process group id of the spawned process
    pub process_group: Option<i32>,
    /// Last known lifecycle status
    pub status: SessionStatus,
    /// Spawn time
    pub started_at: DateTime<Utc>,
    /// Terminal transition time
    pub ended_at: Option<DateTime<Utc>>,
    /// Last recorded activity
    pub last_activity_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Record for a freshly spawned session
    #[must_use]
    pub fn started(id: Uuid, owner: Option<String>, process_group: Option<i32>) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            process_group,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            last_activity_at: now,
        }
    }

    /// Apply a status transition
    pub fn transition(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_activity_at = at;
        if status.is_terminal() && self.ended_at.is_none() {
            self.ended_at = Some(at);
        }
    }
}
