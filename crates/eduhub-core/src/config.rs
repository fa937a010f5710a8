//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, the last used identifier and local-mode
//! preferences, plus the timing knobs of the session lifecycle.
//!
//! Configuration is stored at `~/.config/eduhub/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "eduhub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Storage key for the persisted session, shared with the web client.
pub const AUTH_STORAGE_KEY: &str = "eduhub-auth-data";

/// Demo sessions last 10 minutes.
const DEMO_DURATION_SECS: u64 = 600;

/// How often the demo countdown re-checks the remaining time.
const DEMO_TICK_SECS: u64 = 1;

/// Remembered sessions validated within this window restore without a
/// backend round trip.
const REVALIDATE_AFTER_HOURS: u64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub last_identifier: Option<String>,
    /// Use the in-process backend instead of the hosted service.
    #[serde(default)]
    pub offline: bool,
    /// Keep demo sessions across restarts (until their budget runs out).
    #[serde(default)]
    pub persist_demo: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding client storage (the persisted session).
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            persist_demo: self.persist_demo,
            ..SessionConfig::default()
        }
    }
}

/// Timing and persistence settings for `SessionManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub demo_duration: Duration,
    pub tick_interval: Duration,
    pub revalidate_after: Duration,
    pub persist_demo: bool,
    pub storage_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            demo_duration: Duration::from_secs(DEMO_DURATION_SECS),
            tick_interval: Duration::from_secs(DEMO_TICK_SECS),
            revalidate_after: Duration::from_secs(REVALIDATE_AFTER_HOURS * 3600),
            persist_demo: false,
            storage_key: AUTH_STORAGE_KEY.to_string(),
        }
    }
}
