//! Core error types for hushtable-core.
//!
//! One top-level `CoreError` plus per-concern sub-enums. Parse problems are
//! deliberately absent: the timetable parser recovers locally and never
//! surfaces an error value.

use std::path::PathBuf;
use thiserror::Error;

pub use crate::engine::TimerError;

/// Core error type for hushtable-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Engine state-machine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence-specific errors. A failed write is fatal for that write
/// only; the in-memory state is kept and re-persisted on the next mutation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the preferences database
    #[error("Failed to open preferences database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The data directory could not be resolved or created
    #[error("Failed to prepare data directory: {0}")]
    DataDir(String),

    /// A read or write against the database failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema creation failed
    #[error("Preferences migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded
    #[error("Corrupt value for '{key}': {message}")]
    Corrupt { key: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },
}

/// Engine state-machine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The interruption-filter capability is not granted. Surfaced to the
    /// caller; retried only on the next explicit user action.
    #[error("interruption-filter access not granted")]
    PermissionRequired,

    /// A compensation rule that Saturday cannot follow (itself).
    #[error("Saturday cannot follow itself")]
    InvalidCompensation,

    /// Persistence failure inside an engine operation
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
