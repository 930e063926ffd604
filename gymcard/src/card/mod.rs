//! Card data structures and storage
//!
//! The 64-byte record, the state the card persists, and the file store
//! backing it.

pub mod atr;
pub mod config;
pub mod record;
pub mod state;
pub mod storage;

pub use atr::{build_atr, card_atr};
pub use config::{CardConfig, DEFAULT_AID};
pub use record::{
    CardData, DateOfBirth, MembershipStatus, RawRecord, RecordError, MAX_PIN_RETRY, RECORD_SIZE,
};
pub use state::CardState;
pub use storage::{CardDataStore, StoreError};
