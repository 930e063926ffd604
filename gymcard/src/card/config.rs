//! Virtual card configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::storage::StoreError;

/// Application identifier of the membership applet
pub const DEFAULT_AID: &[u8] = &[0x26, 0x12, 0x20, 0x03, 0x03, 0x00];

/// Environment variable overriding the storage directory
pub const STORAGE_DIR_ENV: &str = "GYMCARD_STORAGE_DIR";

/// Settings for a [`VirtualCard`](crate::VirtualCard)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Where `card_state.json` lives
    pub storage_dir: PathBuf,
    /// AID answered by SELECT
    pub aid: Vec<u8>,
    /// Refuse CHANGE PIN (6982) unless a PIN was verified in this session
    pub change_pin_requires_session: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            storage_dir: Self::default_storage_dir(),
            aid: DEFAULT_AID.to_vec(),
            change_pin_requires_session: false,
        }
    }
}

impl CardConfig {
    /// `$GYMCARD_STORAGE_DIR`, else `~/.gymcard`, else `/var/lib/gymcard`
    pub fn default_storage_dir() -> PathBuf {
        if let Ok(path) = std::env::var(STORAGE_DIR_ENV) {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".gymcard");
        }
        PathBuf::from("/var/lib/gymcard")
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Read a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
