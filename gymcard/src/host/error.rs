//! Host-side errors

use thiserror::Error;

use super::status::CardStatus;
use super::sync::SyncError;
use super::transport::TransportError;
use crate::apdu::APDUError;
use crate::card::RecordError;
use crate::crypto::RsaError;

/// Everything a host-side card operation can fail with
///
/// Card answers and transport failures are kept apart: only the former ever
/// say anything about a PIN.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Wrong PIN, {retries_left} attempts left")]
    WrongPin { retries_left: u8 },

    #[error("Card is locked")]
    CardLocked,

    #[error("Security status not satisfied")]
    SecurityNotSatisfied,

    #[error("Card rejected the command length")]
    WrongLength,

    #[error("Instruction not supported by the card")]
    InstructionNotSupported,

    #[error("Card returned status {0:04X}")]
    Status(u16),

    #[error("Unexpected response: expected {expected} bytes, got {actual}")]
    UnexpectedResponse { expected: usize, actual: usize },

    #[error("Card is blank")]
    NotProvisioned,

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i32),

    #[error("Insufficient balance: {balance} available, {amount} required")]
    InsufficientBalance { balance: i32, amount: i32 },

    #[error("Balance would overflow")]
    BalanceOverflow,

    #[error("Card signature did not verify")]
    AuthenticationFailed,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Apdu(#[from] APDUError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Rsa(#[from] RsaError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl Error {
    /// The error for a non-success status, `None` for 9000
    pub fn from_status(status: CardStatus) -> Option<Self> {
        match status {
            CardStatus::Success => None,
            CardStatus::WrongPin { retries_left } => Some(Error::WrongPin { retries_left }),
            CardStatus::CardLocked => Some(Error::CardLocked),
            CardStatus::SecurityNotSatisfied => Some(Error::SecurityNotSatisfied),
            CardStatus::WrongLength => Some(Error::WrongLength),
            CardStatus::InstructionNotSupported => Some(Error::InstructionNotSupported),
            CardStatus::Other(sw) => Some(Error::Status(sw)),
        }
    }

    /// Whether this error is the card's verdict on a PIN
    pub fn is_pin_failure(&self) -> bool {
        matches!(self, Error::WrongPin { .. } | Error::CardLocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(Error::from_status(CardStatus::Success).is_none());
        assert!(matches!(
            Error::from_status(CardStatus::WrongPin { retries_left: 1 }),
            Some(Error::WrongPin { retries_left: 1 })
        ));
        assert!(matches!(
            Error::from_status(CardStatus::Other(0x6A82)),
            Some(Error::Status(0x6A82))
        ));
    }

    #[test]
    fn test_transport_is_not_a_pin_failure() {
        let err = Error::from(TransportError::NoCard);
        assert!(!err.is_pin_failure());
        assert!(Error::CardLocked.is_pin_failure());
        assert_eq!(
            Error::WrongPin { retries_left: 3 }.to_string(),
            "Wrong PIN, 3 attempts left"
        );
    }
}
