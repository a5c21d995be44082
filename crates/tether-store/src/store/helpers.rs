//! Helper functions for store module

use crate::error::Error;
use crate::record::SessionRecord;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tether_protocol::SessionStatus;
use uuid::Uuid;

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp: {e}")))
}

/// Convert a SQLite row to a SessionRecord
pub(crate) fn row_to_record(row: SqliteRow) -> Result<SessionRecord, Error> {
    let id_str: String = row.get("id");
    let status_str: String = row.get("status");
    let started_at_str: String = row.get("started_at");
    let ended_at_str: Option<String> = row.get("ended_at");
    let last_activity_str: String = row.get("last_activity_at");

    let id =
        Uuid::parse_str(&id_str).map_err(|e| Error::Serialization(format!("invalid uuid: {e}")))?;
    let status: SessionStatus = status_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;

    Ok(SessionRecord {
        id,
        owner: row.get("owner"),
        process_group: row.get("process_group"),
        status,
        started_at: parse_timestamp(&started_at_str)?,
        ended_at: ended_at_str.as_deref().map(parse_timestamp).transpose()?,
        last_activity_at: parse_timestamp(&last_activity_str)?,
    })
}

/// Get the default data directory for Tether
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".tether"))
        .unwrap_or_else(|| std::path::PathBuf::from(".tether"))
}

/// Get the default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join("sessions.db")
}
