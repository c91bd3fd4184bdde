// SPDX-License-Identifier: MPL-2.0

use crate::config::{
    APP_ID, CHROME_BIN_ENV, DEFAULT_API_BASE, DEFAULT_DISCORD_API, DEFAULT_GRID_COLUMNS,
    DEFAULT_ITEM_PAGE, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TOOLTIP_ATTEMPTS,
    DEFAULT_TOOLTIP_BACKOFF_MS, DEFAULT_TOOLTIP_SELECTOR, DEFAULT_TOOLTIP_TIMEOUT_SECS,
    DEFAULT_VIEWPORT_MARGIN, DISCORD_TOKEN_ENV,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Persistent service settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    /// Item page template with `{entry}` and `{realm}` placeholders
    pub item_page_url: String,
    pub discord_api_url: String,
    pub discord_token: Option<String>,
    pub poll_interval_secs: u64,
    pub tooltip_timeout_secs: u64,
    pub tooltip_attempts: u32,
    pub tooltip_backoff_ms: u64,
    /// CSS selector of the tooltip node on an item page
    pub tooltip_selector: String,
    pub grid_columns: usize,
    /// Extra pixels around the measured tooltip grid
    pub viewport_margin: u32,
    pub chrome_executable: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            item_page_url: DEFAULT_ITEM_PAGE.to_string(),
            discord_api_url: DEFAULT_DISCORD_API.to_string(),
            discord_token: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            tooltip_timeout_secs: DEFAULT_TOOLTIP_TIMEOUT_SECS,
            tooltip_attempts: DEFAULT_TOOLTIP_ATTEMPTS,
            tooltip_backoff_ms: DEFAULT_TOOLTIP_BACKOFF_MS,
            tooltip_selector: DEFAULT_TOOLTIP_SELECTOR.to_string(),
            grid_columns: DEFAULT_GRID_COLUMNS,
            viewport_margin: DEFAULT_VIEWPORT_MARGIN,
            chrome_executable: None,
            database_path: None,
        }
    }
}

impl Settings {
    /// Get the settings file path (~/.config/bosswatch/settings.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load the default settings file, falling back to defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::settings_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load settings from `path`; a missing file means defaults, a broken one is an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(DISCORD_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.discord_token = Some(token);
        }
        if let Some(chrome) = lookup(CHROME_BIN_ENV).filter(|c| !c.is_empty()) {
            self.chrome_executable = Some(PathBuf::from(chrome));
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn tooltip_timeout(&self) -> Duration {
        Duration::from_secs(self.tooltip_timeout_secs)
    }

    pub fn tooltip_backoff(&self) -> Duration {
        Duration::from_millis(self.tooltip_backoff_ms)
    }
}
