//! APDU (Application Protocol Data Unit) handling
//!
//! Simple structs and functions for the short ISO 7816-4 APDUs exchanged with
//! the membership card. Nothing the card accepts or returns exceeds 255 data
//! bytes, so extended length encoding is not supported.
//!
//! # Example
//! ```
//! use gymcard::apdu::{parse_apdu, ins, Response};
//!
//! // Parse an incoming APDU (VERIFY PIN "123456", Le = 64)
//! let raw = &[0x00, 0x20, 0x00, 0x00, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x40];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, ins::VERIFY_PIN);
//! assert_eq!(apdu.le, Some(64));
//!
//! // Create a success response
//! let response = Response::success(vec![0x01, 0x02, 0x03]);
//! assert!(response.is_okay());
//! ```

pub mod command;
mod response;
mod status;

pub use command::CardCommand;
pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Command data too long for a short APDU: {0} bytes")]
    DataTooLong(usize),

    #[error("Response too short: expected at least 2 status bytes, got {0}")]
    ResponseTooShort(usize),
}

/// A short command APDU
///
/// CLA is always 00 and P1 P2 are 00 00 for membership commands; only
/// SELECT uses P1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length, 1..=256
    pub le: Option<u16>,
}

impl APDU {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Attach command data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Attach an expected response length (1..=256)
    pub fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// Serialize as a short APDU: CLA INS P1 P2 [Lc Data] [Le]
    ///
    /// Le = 256 is encoded as 0x00.
    pub fn to_bytes(&self) -> Result<Vec<u8>, APDUError> {
        let lc = u8::try_from(self.data.len()).map_err(|_| APDUError::DataTooLong(self.data.len()))?;

        let mut out = vec![self.cla, self.ins, self.p1, self.p2];
        if lc > 0 {
            out.push(lc);
            out.extend_from_slice(&self.data);
        }
        match self.le {
            None => {}
            Some(256) => out.push(0x00),
            Some(le @ 1..=255) => out.push(le as u8),
            Some(_) => return Err(APDUError::InvalidLength),
        }
        Ok(out)
    }
}

/// Parse a short APDU: CLA INS P1 P2 [Lc data] [Le]
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    let (header, body) = match data {
        [cla, ins, p1, p2, body @ ..] => (APDU::new(*cla, *ins, *p1, *p2), body),
        _ => return Err(APDUError::TooShort(data.len())),
    };

    match body {
        [] => Ok(header),
        [le] => Ok(header.with_le(decode_le(*le))),
        [0, ..] => Err(APDUError::InvalidLength),
        [lc, rest @ ..] => {
            let lc = *lc as usize;
            match rest.len().checked_sub(lc) {
                Some(0) => Ok(header.with_data(rest.to_vec())),
                Some(1) => Ok(header
                    .with_data(rest[..lc].to_vec())
                    .with_le(decode_le(rest[lc]))),
                _ => Err(APDUError::InvalidLength),
            }
        }
    }
}

/// Le byte 00 stands for 256
fn decode_le(byte: u8) -> u16 {
    match byte {
        0 => 256,
        n => u16::from(n),
    }
}

/// Membership card instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const READ: u8 = 0xB0;
    pub const WRITE: u8 = 0xD0;
    pub const VERIFY_PIN: u8 = 0x20;
    pub const CHANGE_PIN: u8 = 0x24;
    pub const GET_PUBLIC_KEY: u8 = 0x82;
    pub const SIGN_CHALLENGE: u8 = 0x88;
    pub const ADMIN_UNLOCK: u8 = 0xAA;
    pub const ADMIN_RESET_PIN: u8 = 0xAB;
}
