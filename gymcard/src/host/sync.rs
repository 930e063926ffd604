//! Remote balance records
//!
//! The operator keeps a copy of each member's balance, expiry and name
//! outside the card, keyed by user id. After an admin PIN reset the card's
//! encrypted block is unreadable and is rebuilt from that copy.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::CardData;

/// A member's data as held by the balance service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCardData {
    pub balance: i32,
    pub expiry_days: i16,
    pub full_name: String,
}

impl From<&CardData> for RemoteCardData {
    fn from(data: &CardData) -> Self {
        Self {
            balance: data.balance,
            expiry_days: data.expiry_days,
            full_name: data.full_name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No remote record for user {0}")]
    NotFound(u16),

    #[error("Balance store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Balance store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where remote balance records come from and go to
pub trait BalanceSource {
    fn fetch(&self, user_id: u16) -> Result<RemoteCardData, SyncError>;

    fn push(&mut self, user_id: u16, data: &RemoteCardData) -> Result<(), SyncError>;

    fn delete(&mut self, user_id: u16) -> Result<(), SyncError>;
}

/// Balance records held in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryBalanceSource {
    records: BTreeMap<u16, RemoteCardData>,
}

impl InMemoryBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BalanceSource for InMemoryBalanceSource {
    fn fetch(&self, user_id: u16) -> Result<RemoteCardData, SyncError> {
        self.records
            .get(&user_id)
            .cloned()
            .ok_or(SyncError::NotFound(user_id))
    }

    fn push(&mut self, user_id: u16, data: &RemoteCardData) -> Result<(), SyncError> {
        self.records.insert(user_id, data.clone());
        Ok(())
    }

    fn delete(&mut self, user_id: u16) -> Result<(), SyncError> {
        self.records.remove(&user_id);
        Ok(())
    }
}

/// Balance records in a JSON file: `{"cards": {"1234": {...}}}`
pub struct JsonFileBalanceSource {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BalanceFile {
    #[serde(default)]
    cards: BTreeMap<String, RemoteCardData>,
}

impl JsonFileBalanceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BalanceFile, SyncError> {
        if !self.path.exists() {
            return Ok(BalanceFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, file: &BalanceFile) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(file)?)?;
        debug!("Saved balance records to {:?}", self.path);
        Ok(())
    }
}

impl BalanceSource for JsonFileBalanceSource {
    fn fetch(&self, user_id: u16) -> Result<RemoteCardData, SyncError> {
        self.read()?
            .cards
            .remove(&user_id.to_string())
            .ok_or(SyncError::NotFound(user_id))
    }

    fn push(&mut self, user_id: u16, data: &RemoteCardData) -> Result<(), SyncError> {
        let mut file = self.read()?;
        file.cards.insert(user_id.to_string(), data.clone());
        self.write(&file)
    }

    fn delete(&mut self, user_id: u16) -> Result<(), SyncError> {
        let mut file = self.read()?;
        if file.cards.remove(&user_id.to_string()).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn remote() -> RemoteCardData {
        RemoteCardData {
            balance: 250_000,
            expiry_days: 12,
            full_name: "Tran Thi B".to_string(),
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(remote()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"balance": 250000, "expiryDays": 12, "fullName": "Tran Thi B"})
        );
    }

    #[test]
    fn test_in_memory_source() {
        let mut source = InMemoryBalanceSource::new();
        assert!(matches!(source.fetch(7), Err(SyncError::NotFound(7))));

        source.push(7, &remote()).unwrap();
        assert_eq!(source.fetch(7).unwrap(), remote());
        assert_eq!(source.len(), 1);

        source.delete(7).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_json_file_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("balances.json");
        let mut source = JsonFileBalanceSource::new(&path);

        assert!(matches!(source.fetch(1), Err(SyncError::NotFound(1))));
        source.push(1, &remote()).unwrap();

        let reopened = JsonFileBalanceSource::new(&path);
        assert_eq!(reopened.fetch(1).unwrap(), remote());

        source.delete(1).unwrap();
        assert!(matches!(reopened.fetch(1), Err(SyncError::NotFound(1))));
    }
}
