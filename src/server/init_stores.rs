//! Store initialization
//!
//! Opens the session record store used for crash recovery.

use super::config::StoreConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tether_store::{MemorySessionStore, SessionStore, SqliteSessionStore};
use tracing::{info, warn};

/// Open the configured session store
pub async fn init_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    if config.ephemeral {
        warn!("Ephemeral session store: records are lost on restart");
        return Ok(Arc::new(MemorySessionStore::new()));
    }

    let db_path = config.db_path();
    let store = SqliteSessionStore::from_path(&db_path)
        .await
        .with_context(|| format!("Failed to open session store at {}", db_path.display()))?;
    info!("Session store initialized at {}", db_path.display());
    Ok(Arc::new(store))
}
