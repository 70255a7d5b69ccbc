use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::calls::PARTICIPANTS_PER_PAGE;

pub const MAX_ACTIVE_SPEAKERS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallingConfig {
    /// Read once when the registry is built.
    pub enforce_constant_bitrate: bool,
    pub participants_per_page: usize,
    pub max_active_speakers: usize,
    pub screen_sharing_supported: bool,
    pub video_calling_enabled: bool,
    pub detached_window_supported: bool,
}

impl Default for CallingConfig {
    fn default() -> Self {
        Self {
            enforce_constant_bitrate: false,
            participants_per_page: PARTICIPANTS_PER_PAGE,
            max_active_speakers: MAX_ACTIVE_SPEAKERS,
            screen_sharing_supported: true,
            video_calling_enabled: true,
            detached_window_supported: false,
        }
    }
}

impl CallingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CallingConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn normalized(mut self) -> Self {
        self.participants_per_page = self.participants_per_page.max(1);
        self
    }
}
