//! In-memory session store

use super::traits::SessionStore;
use crate::error::{Error, Result};
use crate::record::SessionRecord;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tether_protocol::SessionStatus;
use uuid::Uuid;

/// Session records kept in a map; lost on restart
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn record_started(&self, record: &SessionRecord) -> Result<()> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn record_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.transition(status, at);
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut active: Vec<SessionRecord> = self
            .records
            .read()
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.started_at);
        Ok(active)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
