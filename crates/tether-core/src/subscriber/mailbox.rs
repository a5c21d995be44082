use parking_lot::Mutex;
use std::collections::VecDeque;
use tether_protocol::StreamEvent;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct MailboxState {
    queue: VecDeque<StreamEvent>,
    closed: bool,
    dropped: u64,
}

/// Bounded single-consumer queue of events for one subscriber
#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` events (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue without blocking; returns `false` if the mailbox is closed
    pub fn push(&self, event: StreamEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(event);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Enqueue the terminal event and close.
    ///
    /// The terminal event is always admitted, evicting the oldest pending
    /// event if necessary.
    pub fn push_terminal(&self, event: StreamEvent) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(event);
        state.closed = true;
        drop(state);
        self.notify.notify_one();
    }

    /// Close without a final event; pending events can still be received
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Next event, or `None` once closed and drained
    pub async fn recv(&self) -> Option<StreamEvent> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(event) = state.queue.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Events dropped because this subscriber fell behind
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Number of pending events
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no event is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the mailbox accepts no further events
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
