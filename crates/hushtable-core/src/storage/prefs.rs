//! SQLite-backed key/value preferences.
//!
//! A single `prefs` table under one namespace holds every persisted value
//! the engine owns: the serialized slot set, the compensation rule, the
//! scheduling/filter flags, and the last acquired raw timetable document.
//! Multi-key writes go through one transaction so a reader never observes
//! a partially written schedule.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use crate::error::StoreError;

/// Key/value preferences database.
pub struct PrefsDb {
    conn: Connection,
}

impl PrefsDb {
    /// Open the preferences database at `~/.config/hushtable/hushtable.db`.
    ///
    /// Creates the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::DataDir(e.to_string()))?;
        Self::open_at(&dir.join("hushtable.db"))
    }

    /// Open at an explicit path (hosts with their own data directory).
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, ephemeral hosts).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prefs (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    /// Write several keys atomically.
    pub fn set_many(&mut self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO prefs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM prefs WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Drop every persisted value.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM prefs", [])?;
        Ok(())
    }
}
