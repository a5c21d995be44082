//! Tether Client - reconnecting consumer of execution streams
//!
//! - Backoff: exponential reconnect delays with jitter
//! - Listeners: per-event-kind callbacks that survive reconnects
//! - Queue: bounded event queue drained in batches, with overflow reports
//! - Transport: the connection seam, with an SSE-over-HTTP implementation
//! - Client: the [`StreamingClient`] connection loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod error;
pub mod listeners;
pub mod queue;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use client::{ClientOptions, ClientState, StreamingClient};
pub use error::{ClientError, Result};
pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use queue::{EventQueue, OverflowReporter};
pub use transport::{decode_sse, EventStream, HttpTransport, Transport, DEFAULT_IDLE_TIMEOUT};
