//! Database schema migrations.
//!
//! The store is a single key/value table holding JSON documents, plus the
//! schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use kwararru_core::error::KwararruError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), KwararruError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| KwararruError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| KwararruError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: kv_entries");
    }

    Ok(())
}

/// Version 1: key/value table.
fn apply_v1(conn: &Connection) -> Result<(), KwararruError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_entries (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'kv_entries');
        ",
    )
    .map_err(|e| KwararruError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
