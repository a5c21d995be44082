//! Event listeners keyed by event kind
//!
//! The registry is a plain value owned by the client, independent of any
//! transport, so listeners stay attached across reconnects.

use std::sync::Arc;
use tether_protocol::{EventKind, StreamEvent};

/// Callback invoked for each dispatched event
pub type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to remove a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Listeners in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl ListenerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push(Entry { id, kind, listener });
        id
    }

    /// Listen to one event kind
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(listener))
    }

    /// Listen to every event
    pub fn on_any<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(listener))
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Listeners interested in `kind`, in registration order
    #[must_use]
    pub fn matching(&self, kind: EventKind) -> Vec<Listener> {
        self.entries
            .iter()
            .filter(|entry| entry.kind.map_or(true, |k| k == kind))
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    /// Call every interested listener; returns how many ran
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let listeners = self.matching(event.kind());
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Remove every listener
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of listeners
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listener is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.entries.len())
            .finish()
    }
}
