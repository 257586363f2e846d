//! Session state persisted between runs.
//!
//! Loaded at startup, saved on normal shutdown. Carries the handoff data
//! deep navigation needs on the next launch (last host, last directory)
//! plus the directories and sizes the cache and download paths derive from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Persisted session state. All fields default so a missing or partial
/// file never blocks startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identity of the host selected when the app last shut down.
    #[serde(default)]
    pub last_host: Option<String>,
    /// Absolute path of the directory selected at shutdown.
    #[serde(default)]
    pub last_dir: Option<String>,
    /// Edge length thumbnails are scaled to.
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,
    /// Download staging directory.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    /// Thumbnail cache directory.
    #[serde(default = "default_thumbs_dir")]
    pub thumbs_dir: PathBuf,
}

fn default_thumb_width() -> u32 {
    128
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_thumbs_dir() -> PathBuf {
    PathBuf::from("thumbs")
}

impl Default for Session {
    fn default() -> Self {
        Self {
            last_host: None,
            last_dir: None,
            thumb_width: default_thumb_width(),
            downloads_dir: default_downloads_dir(),
            thumbs_dir: default_thumbs_dir(),
        }
    }
}

impl Session {
    /// Loads session state from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Persists session state, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
