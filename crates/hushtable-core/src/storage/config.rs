//! TOML-based application configuration.
//!
//! Stores the few tunables the daemon exposes: the periodic
//! reconciliation cadence and its jitter. Stored at
//! `~/.config/hushtable/config.toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// The tick cadence band. Outside it self-healing either lags badly or
/// wakes the device too often.
const TICK_INTERVAL_MIN_SECS: u64 = 3 * 60;
const TICK_INTERVAL_MAX_SECS: u64 = 10 * 60;

/// Engine cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between periodic reconciliation ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Uniform jitter applied to each tick, in seconds either way.
    #[serde(default = "default_tick_jitter")]
    pub tick_jitter_secs: u64,
}

fn default_tick_interval() -> u64 {
    5 * 60
}
fn default_tick_jitter() -> u64 {
    45
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            tick_jitter_secs: default_tick_jitter(),
        }
    }
}

impl EngineConfig {
    /// The configured interval clamped into the supported band.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(
            self.tick_interval_secs
                .clamp(TICK_INTERVAL_MIN_SECS, TICK_INTERVAL_MAX_SECS),
        )
    }

    /// Jitter never exceeds half the interval.
    pub fn tick_jitter(&self) -> Duration {
        let max = self.tick_interval().as_secs() / 2;
        Duration::from_secs(self.tick_jitter_secs.min(max))
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/hushtable/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    fn path() -> Result<std::path::PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: "~/.config/hushtable".into(),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().map_err(|e| match e {
            ConfigError::LoadFailed { path, message } => ConfigError::SaveFailed { path, message },
            other => other,
        })?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Load from disk, returning defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
