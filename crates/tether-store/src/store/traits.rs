//! Trait for session record backends

use crate::error::Result;
use crate::record::SessionRecord;
use chrono::{DateTime, Utc};
use tether_protocol::SessionStatus;
use uuid::Uuid;

/// Session record storage.
///
/// Owned by the orchestration collaborator; the streaming core writes only
/// the transitions it causes and reads active records during crash recovery.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a newly spawned session
    async fn record_started(&self, record: &SessionRecord) -> Result<()>;

    /// Persist a status transition; terminal statuses also set `ended_at`
    async fn record_status(&self, id: Uuid, status: SessionStatus, at: DateTime<Utc>)
        -> Result<()>;

    /// Sessions last seen `active` or `paused`
    async fn active_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Fetch one record
    async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}
