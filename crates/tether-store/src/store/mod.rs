//! Store - session record persistence
//!
//! SQLite through sqlx for real deployments (embedded, no external service)
//! and an in-memory map for tests and ephemeral servers.

mod helpers;
mod memory;
mod sqlite;
mod traits;


pub use helpers::{default_data_dir, default_db_path};
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use traits::SessionStore;
