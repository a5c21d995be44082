use super::Mailbox;
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tether_protocol::StreamEvent;
use uuid::Uuid;

type Detach = Box<dyn FnOnce() + Send>;

/// One observer's view of a session: replayed history followed by live
/// events. Dropping it unregisters the subscriber.
pub struct Subscription {
    session_id: Uuid,
    replay: VecDeque<StreamEvent>,
    mailbox: Option<Arc<Mailbox>>,
    detach: Option<Detach>,
}

impl Subscription {
    /// Subscription that continues with live events after `replay`
    pub(crate) fn live(
        session_id: Uuid,
        replay: VecDeque<StreamEvent>,
        mailbox: Arc<Mailbox>,
        detach: Detach,
    ) -> Self {
        Self {
            session_id,
            replay,
            mailbox: Some(mailbox),
            detach: Some(detach),
        }
    }

    /// Subscription to a session that has already ended
    pub(crate) fn finished(session_id: Uuid, replay: VecDeque<StreamEvent>) -> Self {
        Self {
            session_id,
            replay,
            mailbox: None,
            detach: None,
        }
    }

    /// Session this subscription observes
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Events not yet received from the replay snapshot
    #[must_use]
    pub fn pending_replay(&self) -> usize {
        self.replay.len()
    }

    /// Live events dropped because this subscriber fell behind
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.mailbox.as_ref().map_or(0, |m| m.dropped())
    }

    /// Next event; `None` after the terminal event has been received
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        match &self.mailbox {
            Some(mailbox) => mailbox.recv().await,
            None => None,
        }
    }

    /// Convert into a `Stream` of events
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .field("pending_replay", &self.replay.len())
            .field("live", &self.mailbox.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
