mod config;
mod prefs;
mod schedule_store;

pub use config::{Config, EngineConfig};
pub use prefs::PrefsDb;
pub use schedule_store::{ScheduleChange, ScheduleStore};

use std::path::PathBuf;

/// Returns `~/.config/hushtable[-dev]/` based on HUSHTABLE_ENV.
///
/// Set HUSHTABLE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HUSHTABLE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("hushtable-dev")
    } else {
        base_dir.join("hushtable")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
