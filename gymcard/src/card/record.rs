//! The 64-byte card record
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 2 | UserID, u16 BE |
//! | 2 | 16 | AES-128-ECB of BE(balance i32) ‖ BE(expiry i16) ‖ 10 × 00 |
//! | 18 | 16 | first 16 bytes of SHA-256(PIN) |
//! | 34 | 1 | PIN retry counter, 0 means locked |
//! | 35 | 1 | day of birth |
//! | 36 | 1 | month of birth |
//! | 37 | 2 | year of birth, u16 BE |
//! | 39 | 25 | full name, UTF-8, zero padded |
//!
//! [`RawRecord`] is what the card stores and hands out. [`CardData`] is the
//! decoded view the host works with.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{AesError, AesOperations, HashOperations, PIN_HASH_SIZE};

pub const RECORD_SIZE: usize = 64;

pub const OFFSET_USER_ID: usize = 0;
pub const OFFSET_ENCRYPTED: usize = 2;
pub const ENCRYPTED_SIZE: usize = 16;
pub const OFFSET_PIN_HASH: usize = 18;
pub const OFFSET_RETRY: usize = 34;
pub const OFFSET_DOB_DAY: usize = 35;
pub const OFFSET_DOB_MONTH: usize = 36;
pub const OFFSET_DOB_YEAR: usize = 37;
pub const OFFSET_FULL_NAME: usize = 39;
pub const FULL_NAME_SIZE: usize = 25;

/// Retry counter value after a successful VERIFY or an admin unlock
pub const MAX_PIN_RETRY: u8 = 5;

/// Balance and expiry placeholder when the PIN is not known
pub const UNKNOWN: i32 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Card record must be exactly 64 bytes, got {0}")]
    WrongLength(usize),

    #[error(transparent)]
    Aes(#[from] AesError),
}

/// The record exactly as the card stores it
#[derive(Clone, PartialEq, Eq)]
pub struct RawRecord([u8; RECORD_SIZE]);

impl RawRecord {
    /// All zeros with a full retry counter: a card nobody has provisioned
    pub fn blank() -> Self {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[OFFSET_RETRY] = MAX_PIN_RETRY;
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let bytes: [u8; RECORD_SIZE] = bytes
            .try_into()
            .map_err(|_| RecordError::WrongLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }

    pub fn user_id(&self) -> u16 {
        u16::from_be_bytes([self.0[OFFSET_USER_ID], self.0[OFFSET_USER_ID + 1]])
    }

    /// UserID 0 marks a blank (or erased) card
    pub fn is_blank(&self) -> bool {
        self.user_id() == 0
    }

    pub fn encrypted_block(&self) -> &[u8] {
        &self.0[OFFSET_ENCRYPTED..OFFSET_ENCRYPTED + ENCRYPTED_SIZE]
    }

    pub fn set_encrypted_block(&mut self, block: &[u8; ENCRYPTED_SIZE]) {
        self.0[OFFSET_ENCRYPTED..OFFSET_ENCRYPTED + ENCRYPTED_SIZE].copy_from_slice(block);
    }

    pub fn pin_hash(&self) -> &[u8] {
        &self.0[OFFSET_PIN_HASH..OFFSET_PIN_HASH + PIN_HASH_SIZE]
    }

    pub fn set_pin_hash(&mut self, hash: &[u8; PIN_HASH_SIZE]) {
        self.0[OFFSET_PIN_HASH..OFFSET_PIN_HASH + PIN_HASH_SIZE].copy_from_slice(hash);
    }

    pub fn retry_counter(&self) -> u8 {
        self.0[OFFSET_RETRY]
    }

    pub fn set_retry_counter(&mut self, retries: u8) {
        self.0[OFFSET_RETRY] = retries;
    }

    pub fn is_locked(&self) -> bool {
        self.retry_counter() == 0
    }
}

impl From<[u8; RECORD_SIZE]> for RawRecord {
    fn from(bytes: [u8; RECORD_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Default for RawRecord {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRecord")
            .field("user_id", &self.user_id())
            .field("retry_counter", &self.retry_counter())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateOfBirth {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl DateOfBirth {
    pub fn new(day: u8, month: u8, year: u16) -> Self {
        Self { day, month, year }
    }
}

impl fmt::Display for DateOfBirth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}/{:04}", self.day, self.month, self.year)
    }
}

/// Days left at or below which a membership counts as expiring soon
pub const EXPIRING_SOON_DAYS: i16 = 7;

/// Standing of a membership, judged from its remaining days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    /// Decoded without a PIN
    Unknown,
    Expired,
    ExpiringSoon,
    Active,
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MembershipStatus::Unknown => "unknown",
            MembershipStatus::Expired => "expired",
            MembershipStatus::ExpiringSoon => "expiring soon",
            MembershipStatus::Active => "active",
        };
        f.write_str(label)
    }
}

/// Decoded card contents
///
/// `balance` and `expiry_days` are [`UNKNOWN`] when the record was decoded
/// without a PIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub user_id: u16,
    pub balance: i32,
    pub expiry_days: i16,
    pub retry_counter: u8,
    pub dob: DateOfBirth,
    pub full_name: String,
}

impl Default for CardData {
    fn default() -> Self {
        Self {
            user_id: 0,
            balance: 0,
            expiry_days: 0,
            retry_counter: MAX_PIN_RETRY,
            dob: DateOfBirth::default(),
            full_name: String::new(),
        }
    }
}

impl CardData {
    /// Encode into the 64-byte layout, encrypting balance and expiry under
    /// the key derived from `pin` and storing the PIN's hash
    ///
    /// Values are written as-is; the name is cut at 25 bytes.
    pub fn encode(&self, pin: &[u8]) -> Result<RawRecord, RecordError> {
        let key = HashOperations::derive_key(pin);
        let block = AesOperations::encrypt_block(self.balance, self.expiry_days, key.as_bytes())?;

        let mut record = RawRecord([0u8; RECORD_SIZE]);
        record.0[OFFSET_USER_ID..OFFSET_USER_ID + 2].copy_from_slice(&self.user_id.to_be_bytes());
        record.set_encrypted_block(&block);
        record.set_pin_hash(&HashOperations::hash_pin(pin));
        record.set_retry_counter(self.retry_counter);
        record.0[OFFSET_DOB_DAY] = self.dob.day;
        record.0[OFFSET_DOB_MONTH] = self.dob.month;
        record.0[OFFSET_DOB_YEAR..OFFSET_DOB_YEAR + 2].copy_from_slice(&self.dob.year.to_be_bytes());

        let name = self.full_name.as_bytes();
        let len = name.len().min(FULL_NAME_SIZE);
        record.0[OFFSET_FULL_NAME..OFFSET_FULL_NAME + len].copy_from_slice(&name[..len]);

        Ok(record)
    }

    /// Decode a record read from the card, decrypting the sensitive block
    /// with the key derived from `pin`
    ///
    /// A wrong PIN gives wrong numbers, not an error.
    pub fn decode_encrypted(bytes: &[u8], pin: &[u8]) -> Result<Self, RecordError> {
        let record = RawRecord::from_bytes(bytes)?;
        let key = HashOperations::derive_key(pin);
        let (balance, expiry_days) = AesOperations::decrypt_block(record.encrypted_block(), key.as_bytes())?;
        Ok(Self::from_plain_fields(&record, balance, expiry_days))
    }

    /// Decode a VERIFY PIN response, where the card already replaced the
    /// sensitive block with its plaintext
    pub fn decode_already_decrypted(bytes: &[u8]) -> Result<Self, RecordError> {
        let record = RawRecord::from_bytes(bytes)?;
        let mut plaintext = [0u8; ENCRYPTED_SIZE];
        plaintext.copy_from_slice(record.encrypted_block());
        let (balance, expiry_days) = AesOperations::split_plaintext(&plaintext);
        Ok(Self::from_plain_fields(&record, balance, expiry_days))
    }

    /// Decode only the plaintext fields; balance and expiry come back as -1
    pub fn decode_plaintext_only(bytes: &[u8]) -> Result<Self, RecordError> {
        let record = RawRecord::from_bytes(bytes)?;
        Ok(Self::from_plain_fields(&record, UNKNOWN, UNKNOWN as i16))
    }

    pub fn has_known_balance(&self) -> bool {
        self.balance != UNKNOWN || self.expiry_days != UNKNOWN as i16
    }

    pub fn membership_status(&self) -> MembershipStatus {
        if !self.has_known_balance() {
            MembershipStatus::Unknown
        } else if self.expiry_days <= 0 {
            MembershipStatus::Expired
        } else if self.expiry_days <= EXPIRING_SOON_DAYS {
            MembershipStatus::ExpiringSoon
        } else {
            MembershipStatus::Active
        }
    }

    pub fn is_locked(&self) -> bool {
        self.retry_counter == 0
    }

    fn from_plain_fields(record: &RawRecord, balance: i32, expiry_days: i16) -> Self {
        let b = record.as_bytes();
        Self {
            user_id: record.user_id(),
            balance,
            expiry_days,
            retry_counter: record.retry_counter(),
            dob: DateOfBirth {
                day: b[OFFSET_DOB_DAY],
                month: b[OFFSET_DOB_MONTH],
                year: u16::from_be_bytes([b[OFFSET_DOB_YEAR], b[OFFSET_DOB_YEAR + 1]]),
            },
            full_name: decode_name(&b[OFFSET_FULL_NAME..OFFSET_FULL_NAME + FULL_NAME_SIZE]),
        }
    }
}

/// Zero padding is dropped, and so is a multi-byte character the 25-byte cut
/// split in half.
fn decode_name(field: &[u8]) -> String {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let field = &field[..end];
    match std::str::from_utf8(field) {
        Ok(name) => name.to_string(),
        Err(e) if e.error_len().is_none() => {
            String::from_utf8_lossy(&field[..e.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(field).into_owned(),
    }
}
