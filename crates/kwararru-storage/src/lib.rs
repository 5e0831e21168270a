//! Kwararru Storage crate - key/value persistence seam.
//!
//! Provides the `KeyValueStore` trait with in-memory and WAL-mode SQLite
//! backends, and `PersistedState`, the typed facade the engine reads its
//! settings, histories and workflows through.

pub mod db;
pub mod migrations;
pub mod persisted;
pub mod store;

pub use persisted::{keys, PersistedState};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
