//! Session lifecycle
//!
//! A session binds one external process to its ring buffer and its
//! subscribers. The [`SessionManager`] spawns and controls processes; the
//! [`SessionRegistry`] it is given holds the live sessions.

mod handle;
mod manager;
mod reader;
mod recovery;
mod registry;
mod sweep;
mod types;

pub use handle::SessionHandle;
pub use manager::SessionManager;
pub use recovery::{reconcile, RecoveryReport};
pub use registry::SessionRegistry;
pub use sweep::{spawn_sweeper, SweepReport};
pub use types::{SessionId, SessionSummary, SpawnRequest};

#[cfg(test)]
mod tests;
