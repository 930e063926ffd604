//! Typed card status outcomes

use std::fmt;

use crate::apdu::SW;

/// What a status word means to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatus {
    Success,
    /// `63Cn`: PIN rejected, `n` attempts left (0 means the card just locked)
    WrongPin { retries_left: u8 },
    /// `6983`
    CardLocked,
    /// `6982`
    SecurityNotSatisfied,
    /// `67xx`
    WrongLength,
    /// `6Dxx`
    InstructionNotSupported,
    Other(u16),
}

impl CardStatus {
    pub fn from_sw(sw: u16) -> Self {
        if SW::is_success(sw) {
            return CardStatus::Success;
        }
        if let Some(retries_left) = SW::get_retry_count(sw) {
            return CardStatus::WrongPin { retries_left };
        }
        match sw {
            SW::AUTH_METHOD_BLOCKED => CardStatus::CardLocked,
            SW::SECURITY_STATUS_NOT_SATISFIED => CardStatus::SecurityNotSatisfied,
            _ if SW::same_class(sw, SW::WRONG_LENGTH) => CardStatus::WrongLength,
            _ if SW::same_class(sw, SW::INS_NOT_SUPPORTED) => CardStatus::InstructionNotSupported,
            _ => CardStatus::Other(sw),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CardStatus::Success)
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardStatus::Success => write!(f, "success"),
            CardStatus::WrongPin { retries_left } => {
                write!(f, "wrong PIN, {} attempts left", retries_left)
            }
            CardStatus::CardLocked => write!(f, "card locked"),
            CardStatus::SecurityNotSatisfied => write!(f, "security status not satisfied"),
            CardStatus::WrongLength => write!(f, "wrong length"),
            CardStatus::InstructionNotSupported => write!(f, "instruction not supported"),
            CardStatus::Other(sw) => write!(f, "status {:04X}", sw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sw() {
        assert_eq!(CardStatus::from_sw(0x9000), CardStatus::Success);
        assert_eq!(CardStatus::from_sw(0x63C3), CardStatus::WrongPin { retries_left: 3 });
        assert_eq!(CardStatus::from_sw(0x63C0), CardStatus::WrongPin { retries_left: 0 });
        assert_eq!(CardStatus::from_sw(0x6983), CardStatus::CardLocked);
        assert_eq!(CardStatus::from_sw(0x6982), CardStatus::SecurityNotSatisfied);
        assert_eq!(CardStatus::from_sw(0x6700), CardStatus::WrongLength);
        assert_eq!(CardStatus::from_sw(0x6701), CardStatus::WrongLength);
        assert_eq!(CardStatus::from_sw(0x6D00), CardStatus::InstructionNotSupported);
        assert_eq!(CardStatus::from_sw(0x6A82), CardStatus::Other(0x6A82));
        assert_eq!(CardStatus::from_sw(0x6300), CardStatus::Other(0x6300));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CardStatus::WrongPin { retries_left: 2 }.to_string(),
            "wrong PIN, 2 attempts left"
        );
        assert_eq!(CardStatus::Other(0x6F00).to_string(), "status 6F00");
    }
}
