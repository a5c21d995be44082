use super::handle::SessionHandle;
use super::types::SessionId;
use crate::error::{Error, Result};
use crate::process::ProcessGroup;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<SessionHandle>>,
    groups: HashMap<ProcessGroup, SessionId>,
}

/// Arena of sessions owned by one manager
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session.
    ///
    /// Fails when its process group is already owned by a live session.
    pub fn insert(&self, handle: Arc<SessionHandle>) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(group) = handle.process_group() {
            if let Some(owner) = inner.groups.get(&group) {
                let owner_live = inner.sessions.get(owner).is_some_and(|h| h.is_live());
                if owner_live {
                    return Err(Error::InvalidState(format!(
                        "process group {group} is already owned by session {owner}"
                    )));
                }
            }
            inner.groups.insert(group, handle.id());
        }
        inner.sessions.insert(handle.id(), handle);
        Ok(())
    }

    /// Look up a session
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.read().sessions.get(&id).cloned()
    }

    /// Drop a session, releasing its buffer and subscribers
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let mut inner = self.inner.write();
        let handle = inner.sessions.remove(&id)?;
        if let Some(group) = handle.process_group() {
            if inner.groups.get(&group) == Some(&id) {
                inner.groups.remove(&group);
            }
        }
        Some(handle)
    }

    /// Whether a session id is known
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.inner.read().sessions.contains_key(&id)
    }

    /// Every session, in no particular order
    #[must_use]
    pub fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.inner.read().sessions.values().cloned().collect()
    }

    /// Number of sessions held
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sessions whose process is still running
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|h| h.is_live())
            .count()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
