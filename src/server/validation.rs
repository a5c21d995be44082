//! Startup configuration validation

use super::config::AppConfig;
use anyhow::{bail, Context, Result};
use tracing::warn;

/// Reject unusable limits and warn about risky deployments
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config
        .sessions
        .validate()
        .context("Invalid [sessions] configuration")?;

    if config.server.keep_alive_secs == 0 {
        bail!("server.keep_alive_secs must be greater than zero");
    }
    if config.server.max_output_limit == 0 {
        bail!("server.max_output_limit must be greater than zero");
    }

    let is_production = std::env::var("TETHER_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false);

    if config.server.host != "127.0.0.1" && !config.server.auth.is_enabled() {
        warn!(
            host = %config.server.host,
            "SECURITY WARNING: API is reachable from other hosts without authentication. \
             Set [server.auth] token."
        );
    }

    if is_production && config.store.ephemeral {
        warn!("Session store is ephemeral in production; crash recovery is disabled");
    }

    Ok(())
}
