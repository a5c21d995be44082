//! Server module for Tether
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Startup configuration checks
//! - `init_stores`: Session store selection
//! - `background_tasks`: Sweeper startup
//! - `init`: Main server initialization and run loop

mod background_tasks;
pub mod config;
mod init;
mod init_stores;
mod loader;
mod validation;

pub use init::run;
