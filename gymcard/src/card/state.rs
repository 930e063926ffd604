//! Persisted card state
//!
//! Everything the secure element keeps across power cycles: the 64-byte
//! record and the device's RSA private key. Byte fields are base64 in JSON.

use serde::{Deserialize, Serialize};

use super::record::{RawRecord, RecordError};

/// Byte fields as standard base64 strings
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.trim()).map_err(D::Error::custom)
    }
}

/// What `card_state.json` holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    /// The 64-byte record
    #[serde(with = "base64_bytes")]
    pub record: Vec<u8>,
    /// PKCS#1 DER; empty until the key is generated
    #[serde(with = "base64_bytes", default)]
    pub private_key: Vec<u8>,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            record: RawRecord::blank().as_bytes().to_vec(),
            private_key: Vec::new(),
        }
    }
}

impl CardState {
    /// Blank record plus an existing private key
    pub fn with_private_key(private_key: Vec<u8>) -> Self {
        Self {
            private_key,
            ..Self::default()
        }
    }

    pub fn raw_record(&self) -> Result<RawRecord, RecordError> {
        RawRecord::from_bytes(&self.record)
    }

    pub fn set_record(&mut self, record: &RawRecord) {
        self.record = record.as_bytes().to_vec();
    }

    pub fn has_private_key(&self) -> bool {
        !self.private_key.is_empty()
    }
}
