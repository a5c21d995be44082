//! Server configuration types
//!
//! Contains all configuration structures for the Tether server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tether_core::SessionConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_max_output_limit")]
    pub max_output_limit: usize,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keep_alive_secs: default_keep_alive_secs(),
            max_output_limit: default_max_output_limit(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Interval between SSE keep-alive comments
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_max_output_limit() -> usize {
    1000
}

/// Bearer-token authentication for the API routes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Disabled when unset or empty
    #[serde(default)]
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Session record persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Keep records in memory only
    #[serde(default)]
    pub ephemeral: bool,
    /// SQLite file; `~/.tether/sessions.db` when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(tether_store::default_db_path)
    }
}
