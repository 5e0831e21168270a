//! Key/value storage seam.
//!
//! Values are opaque strings (JSON documents in practice). Hosts plug in
//! whatever backend they have; the engine ships an in-memory map and a
//! SQLite table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use kwararru_core::error::KwararruError;

use crate::db::{self, storage_err};

/// Minimal string key/value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KwararruError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KwararruError>;
    fn remove(&self, key: &str) -> Result<(), KwararruError>;
}

/// Process-local store, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, KwararruError> {
        self.entries
            .lock()
            .map_err(|e| KwararruError::Storage(format!("Memory store lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, KwararruError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KwararruError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KwararruError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Store backed by the `kv_entries` table. Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, KwararruError> {
        Ok(Self::from_connection(db::open(path)?))
    }

    pub fn in_memory() -> Result<Self, KwararruError> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        context: &str,
    ) -> Result<T, KwararruError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KwararruError::Storage(format!("Store lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| storage_err(context, e))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, KwararruError> {
        self.with_conn(
            |conn| {
                conn.query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            },
            &format!("Failed to read {}", key),
        )
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KwararruError> {
        self.with_conn(
            |conn| {
                conn.execute(
                    "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = strftime('%s', 'now')",
                    params![key, value],
                )
            },
            &format!("Failed to write {}", key),
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KwararruError> {
        self.with_conn(
            |conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key]),
            &format!("Failed to remove {}", key),
        )?;
        Ok(())
    }
}
