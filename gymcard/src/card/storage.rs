//! Card state storage
//!
//! The secure element's non-volatile memory, mirrored to a JSON file. Saves
//! and loads report failure to the caller; the applet treats a failed save
//! as a failed command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use thiserror::Error;

use super::config::CardConfig;
use super::state::CardState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Card storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Card state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handles persistent storage of card state
pub struct CardDataStore {
    state_file: Option<PathBuf>,
    pub state: CardState,
}

impl CardDataStore {
    const DEFAULT_STATE_FILE: &'static str = "card_state.json";

    /// Create a store backed by `card_state.json` in `storage_path`, or in
    /// the default directory
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        let storage_dir = storage_path.unwrap_or_else(CardConfig::default_storage_dir);

        Self {
            state_file: Some(storage_dir.join(Self::DEFAULT_STATE_FILE)),
            state: CardState::default(),
        }
    }

    /// A store that never touches the filesystem
    pub fn in_memory(state: CardState) -> Self {
        Self {
            state_file: None,
            state,
        }
    }

    /// Path of the backing file, if any
    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Load card state from storage
    ///
    /// `Ok(false)` when there is no state file yet and the card starts blank.
    /// A file that exists but cannot be read or parsed is an error and the
    /// in-memory state is left alone, so the next save cannot overwrite it.
    pub fn load(&mut self) -> Result<bool, StoreError> {
        let Some(state_file) = self.state_file.as_ref() else {
            return Ok(false);
        };

        if !state_file.exists() {
            info!("No existing card state, creating new");
            self.state = CardState::default();
            return Ok(false);
        }

        match Self::read_state(state_file) {
            Ok(state) => {
                self.state = state;
                info!("Loaded card state from {:?}", state_file);
                Ok(true)
            }
            Err(e) => {
                error!("Card state in {:?} is unusable: {}", state_file, e);
                Err(e)
            }
        }
    }

    fn read_state(path: &Path) -> Result<CardState, StoreError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the state file, replacing the old one only once the new
    /// contents are fully on disk
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(state_file) = self.state_file.as_ref() else {
            return Ok(());
        };

        if let Some(dir) = state_file.parent() {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp_file = state_file.with_extension("json.tmp");
        fs::write(&tmp_file, json)?;

        // Holds the device private key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&tmp_file, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&tmp_file, state_file)?;
        debug!("Saved card state to {:?}", state_file);
        Ok(())
    }
}
