use super::Mailbox;
use std::collections::HashMap;
use std::sync::Arc;
use tether_protocol::StreamEvent;
use tracing::trace;

/// Handle identifying one subscriber within a session
pub type SubscriberId = u64;

/// Live subscribers of one session
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, Arc<Mailbox>>,
    next_id: SubscriberId,
    mailbox_capacity: usize,
}

impl SubscriberRegistry {
    /// Create an empty registry whose mailboxes hold `mailbox_capacity` events
    #[must_use]
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 1,
            mailbox_capacity,
        }
    }

    /// Add a subscriber and return its mailbox
    pub fn register(&mut self) -> (SubscriberId, Arc<Mailbox>) {
        let id = self.next_id;
        self.next_id += 1;
        let mailbox = Arc::new(Mailbox::new(self.mailbox_capacity));
        self.subscribers.insert(id, Arc::clone(&mailbox));
        trace!(subscriber_id = id, "Subscriber registered");
        (id, mailbox)
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unregister(&mut self, id: SubscriberId) {
        if let Some(mailbox) = self.subscribers.remove(&id) {
            mailbox.close();
            trace!(subscriber_id = id, "Subscriber unregistered");
        }
    }

    /// Deliver an event to every subscriber without waiting.
    ///
    /// Returns the number of mailboxes that accepted it.
    pub fn broadcast(&self, event: &StreamEvent) -> usize {
        self.subscribers
            .values()
            .filter(|mailbox| mailbox.push(event.clone()))
            .count()
    }

    /// Deliver the terminal event, close every mailbox and forget them
    pub fn close_with(&mut self, terminal: &StreamEvent) {
        for (_, mailbox) in self.subscribers.drain() {
            mailbox.push_terminal(terminal.clone());
        }
    }

    /// Number of live subscribers
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody is subscribed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
