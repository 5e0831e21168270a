//! Opening the SQLite file that backs [`SqliteStore`](crate::SqliteStore).
//!
//! Every connection handed out here has the `kv_entries` schema in place.

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use kwararru_core::error::KwararruError;

use crate::migrations;

pub(crate) fn storage_err(context: &str, e: rusqlite::Error) -> KwararruError {
    KwararruError::Storage(format!("{}: {}", context, e))
}

/// Open the key/value file at `path` in WAL mode, creating parent
/// directories.
pub fn open(path: &Path) -> Result<Connection, KwararruError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(|e| storage_err("Failed to open store", e))?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(|e| storage_err("Failed to enable WAL", e))?;
    debug!(journal_mode = %mode, "Journal mode set");
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| storage_err("Failed to set synchronous", e))?;

    migrations::run_migrations(&conn)?;
    info!(path = %path.display(), "Key/value store ready");
    Ok(conn)
}

/// A throwaway key/value database.
pub fn open_in_memory() -> Result<Connection, KwararruError> {
    let conn =
        Connection::open_in_memory().map_err(|e| storage_err("Failed to open in-memory store", e))?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
