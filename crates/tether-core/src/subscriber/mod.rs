//! Subscriber fan-out
//!
//! Each observer of a session owns a bounded [`Mailbox`]. Broadcasting never
//! waits on a subscriber: a full mailbox drops its own oldest event. The
//! per-session [`SubscriberRegistry`] is a plain value owned by the session,
//! so there is no process-wide subscriber state.

mod mailbox;
mod registry;
mod subscription;

pub use mailbox::Mailbox;
pub use registry::{SubscriberId, SubscriberRegistry};
pub use subscription::Subscription;
