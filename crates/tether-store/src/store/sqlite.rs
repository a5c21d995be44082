//! SqliteSessionStore - SQLite-backed session records

use super::helpers::row_to_record;
use super::traits::SessionStore;
use crate::error::{Error, Result};
use crate::record::SessionRecord;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tether_protocol::SessionStatus;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Session records persisted to SQLite
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a store over an existing pool (migrations are not run)
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file and run migrations
    pub async fn from_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("SQLite session store initialized at {}", db_path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        debug!("In-memory SQLite session store initialized");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                owner TEXT,
                process_group INTEGER,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                last_activity_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_status
            ON sessions(status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Session store migrations completed");
        Ok(())
    }

    /// Underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, record), fields(session_id = %record.id))]
    async fn record_started(&self, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, owner, process_group, status, started_at, ended_at, last_activity_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                process_group = excluded.process_group,
                status = excluded.status,
                ended_at = excluded.ended_at,
                last_activity_at = excluded.last_activity_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.owner)
        .bind(record.process_group)
        .bind(record.status.as_str())
        .bind(record.started_at.to_rfc3339())
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(record.last_activity_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let at_str = at.to_rfc3339();
        let ended_at = status.is_terminal().then(|| at_str.clone());
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?2,
                last_activity_at = ?3,
                ended_at = COALESCE(ended_at, ?4)
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(&at_str)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sessions
            WHERE status IN ('active', 'paused')
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_record).transpose()
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
