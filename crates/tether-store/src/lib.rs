//! Tether Store - persisted session records
//!
//! The orchestration collaborator owns execution metadata. The streaming
//! core only needs a minimal record per session (id, process group, status,
//! timestamps) so that a restarted server can reconcile sessions that were
//! still marked active when the previous process died.
//!
//! - Record: the persisted [`SessionRecord`]
//! - Store: the [`SessionStore`] trait with SQLite and in-memory backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use record::SessionRecord;
pub use store::{default_data_dir, default_db_path, MemorySessionStore, SessionStore, SqliteSessionStore};
