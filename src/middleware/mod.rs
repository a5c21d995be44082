//! Middleware module for the Tether HTTP server
//!
//! Provides optional bearer-token authentication.

pub mod auth;

pub use auth::{ApiAuth, RequireAuth};
