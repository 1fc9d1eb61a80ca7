// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON at `<config dir>/capture/config.json`. Missing keys take
//! their default value; a missing file yields [`Config::default`].

use crate::backends::camera::types::{DevicePosition, DeviceSettings};
use crate::constants::{DEFAULT_QUEUE_LABEL, SessionPreset, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera opened by default
    pub position: DevicePosition,
    /// Session preset used for new sessions
    pub preset: SessionPreset,
    /// Initial flash/torch/focus settings
    pub settings: DeviceSettings,
    /// Mirror the front camera preview horizontally (selfie mode)
    pub mirror_preview: bool,
    /// Frame interval of the virtual backend in milliseconds
    pub frame_interval_ms: u64,
    /// Name of the session work queue thread
    pub queue_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            position: DevicePosition::default(),
            preset: SessionPreset::default(),
            settings: DeviceSettings::default(),
            mirror_preview: true, // Default to mirrored (selfie mode)
            frame_interval_ms: timing::VIRTUAL_FRAME_INTERVAL.as_millis() as u64,
            queue_label: DEFAULT_QUEUE_LABEL.to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/capture/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("capture").join("config.json"))
    }

    /// Load from [`default_path`](Self::default_path)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = serde_json::from_str(&contents)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}
