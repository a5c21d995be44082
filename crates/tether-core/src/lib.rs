//! Tether Core - realtime execution streaming engine
//!
//! This crate runs external processes on behalf of triggered executions and
//! fans their output out to any number of observers:
//! - Ring Buffer: bounded, ordered store of recent Log Lines per session
//! - Subscriber: per-observer bounded mailboxes with drop-oldest backpressure
//! - Session: the Session Manager, its registry, process-group control,
//!   idle/lifetime sweep and crash recovery
//! - Shutdown: coordinated shutdown of background tasks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hooks;
pub mod process;
pub mod ring_buffer;
pub mod session;
pub mod shutdown;
pub mod subscriber;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use hooks::{NoopHook, TerminalHook};
pub use process::{GroupProbe, ProcessGroup, SignalProbe};
pub use ring_buffer::{Replay, RingBuffer};
pub use session::{
    reconcile, spawn_sweeper, RecoveryReport, SessionHandle, SessionId, SessionManager,
    SessionRegistry, SessionSummary, SpawnRequest, SweepReport,
};
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
pub use subscriber::{Mailbox, SubscriberRegistry, Subscription};
