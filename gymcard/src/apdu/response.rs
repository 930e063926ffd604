//! Response APDUs
//!
//! The applet answers every command with optional data followed by a
//! two-byte status word. The host splits the raw bytes from a transport
//! back into the same shape with [`Response::from_bytes`].

use super::status::SW;
use super::APDUError;

/// Response data plus status word
///
/// # Example
/// ```
/// use gymcard::apdu::{Response, SW};
///
/// let record = Response::success(vec![0x04, 0xD2]);
/// assert!(record.is_okay());
/// assert_eq!(record.to_bytes(), vec![0x04, 0xD2, 0x90, 0x00]);
///
/// let refused = Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
/// assert_eq!(refused.to_bytes(), vec![0x69, 0x82]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    status: u16,
}

impl Response {
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            data,
            status: SW::SUCCESS,
        }
    }

    /// 9000 without data
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// A bare status word; failures never carry data
    pub fn error(sw: u16) -> Self {
        Self {
            data: Vec::new(),
            status: sw,
        }
    }

    /// `63Cn` after a rejected PIN
    pub fn counter_warning(retries_left: u8) -> Self {
        Self::error(SW::counter_warning(retries_left))
    }

    /// Split data ‖ SW1 ‖ SW2 as returned by a transport
    pub fn from_bytes(raw: &[u8]) -> Result<Self, APDUError> {
        let Some((sw, data)) = raw.len().checked_sub(2).map(|n| (&raw[n..], &raw[..n])) else {
            return Err(APDUError::ResponseTooShort(raw.len()));
        };
        Ok(Self {
            data: data.to_vec(),
            status: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    pub fn sw(&self) -> u16 {
        self.status
    }

    pub fn sw1(&self) -> u8 {
        (self.status >> 8) as u8
    }

    pub fn sw2(&self) -> u8 {
        self.status as u8
    }

    pub fn is_okay(&self) -> bool {
        SW::is_success(self.status)
    }

    /// Attempts left when this is a `63Cn` answer
    pub fn retries_left(&self) -> Option<u8> {
        SW::get_retry_count(self.status)
    }

    /// Wire form, data ‖ SW1 ‖ SW2
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.status.to_be_bytes());
        out
    }
}
