//! Cardholder PIN
//!
//! Host-side validation of the 6-digit PIN. The card itself accepts any six
//! bytes; this type keeps the host from sending anything else.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of ASCII digits in a PIN
pub const PIN_LENGTH: usize = 6;

/// PIN written to a freshly erased card
pub const DEFAULT_PIN: &str = "000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be exactly 6 digits, got {0} characters")]
    WrongLength(usize),

    #[error("PIN may only contain the digits 0-9")]
    NotDigits,
}

/// A validated 6-digit PIN
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin([u8; PIN_LENGTH]);

impl Pin {
    pub fn new(pin: &str) -> Result<Self, PinError> {
        Self::from_bytes(pin.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PinError> {
        if bytes.len() != PIN_LENGTH {
            return Err(PinError::WrongLength(bytes.len()));
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(PinError::NotDigits);
        }

        let mut pin = [0u8; PIN_LENGTH];
        pin.copy_from_slice(bytes);
        Ok(Self(pin))
    }

    /// The PIN an erased card carries
    pub fn default_pin() -> Self {
        Self(*b"000000")
    }

    /// ASCII bytes as sent to the card
    pub fn as_bytes(&self) -> &[u8; PIN_LENGTH] {
        &self.0
    }
}

impl FromStr for Pin {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(******)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pin() {
        let pin: Pin = "123456".parse().unwrap();
        assert_eq!(pin.as_bytes(), b"123456");
        assert_eq!(Pin::default_pin().as_bytes(), DEFAULT_PIN.as_bytes());
    }

    #[test]
    fn test_invalid_pins() {
        assert_eq!(Pin::new("12345"), Err(PinError::WrongLength(5)));
        assert_eq!(Pin::new("1234567"), Err(PinError::WrongLength(7)));
        assert_eq!(Pin::new("12a456"), Err(PinError::NotDigits));
        assert_eq!(Pin::new(""), Err(PinError::WrongLength(0)));
    }

    #[test]
    fn test_debug_hides_digits() {
        let pin = Pin::new("987654").unwrap();
        assert!(!format!("{:?}", pin).contains("987654"));
    }
}
