//! Membership card commands
//!
//! One variant per instruction the applet understands. The host turns a
//! variant into an [`APDU`] with [`CardCommand::to_apdu`]; the card turns an
//! incoming APDU back into a variant with [`CardCommand::from_apdu`], which
//! is where lengths are checked and unknown instructions rejected.

use std::fmt;

use super::status::SW;
use super::{ins, APDU};
use crate::card::record::RECORD_SIZE;
use crate::crypto::{RsaOperations, CHALLENGE_LENGTH, PIN_LENGTH};

#[derive(Clone, PartialEq, Eq)]
pub enum CardCommand {
    /// Return the stored record, sensitive block still encrypted
    Read,
    /// Replace the whole record
    Write([u8; RECORD_SIZE]),
    /// Check the PIN; on success the response carries the decrypted block
    VerifyPin([u8; PIN_LENGTH]),
    /// Replace the PIN, re-encrypting the sensitive block
    ChangePin {
        old: [u8; PIN_LENGTH],
        new: [u8; PIN_LENGTH],
    },
    /// Export modulus ‖ exponent
    GetPublicKey,
    /// Sign a 32-byte challenge with the device key
    SignChallenge([u8; CHALLENGE_LENGTH]),
    /// Restore the retry counter without authenticating
    AdminUnlock,
    /// Set a new PIN without knowing the old one
    AdminResetPin([u8; PIN_LENGTH]),
}

impl CardCommand {
    pub fn ins(&self) -> u8 {
        match self {
            CardCommand::Read => ins::READ,
            CardCommand::Write(_) => ins::WRITE,
            CardCommand::VerifyPin(_) => ins::VERIFY_PIN,
            CardCommand::ChangePin { .. } => ins::CHANGE_PIN,
            CardCommand::GetPublicKey => ins::GET_PUBLIC_KEY,
            CardCommand::SignChallenge(_) => ins::SIGN_CHALLENGE,
            CardCommand::AdminUnlock => ins::ADMIN_UNLOCK,
            CardCommand::AdminResetPin(_) => ins::ADMIN_RESET_PIN,
        }
    }

    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CardCommand::Read => "READ",
            CardCommand::Write(_) => "WRITE",
            CardCommand::VerifyPin(_) => "VERIFY_PIN",
            CardCommand::ChangePin { .. } => "CHANGE_PIN",
            CardCommand::GetPublicKey => "GET_PUBLIC_KEY",
            CardCommand::SignChallenge(_) => "SIGN_CHALLENGE",
            CardCommand::AdminUnlock => "ADMIN_UNLOCK",
            CardCommand::AdminResetPin(_) => "ADMIN_RESET_PIN",
        }
    }

    /// Build the APDU the host sends: CLA 00, P1 P2 00 00
    pub fn to_apdu(&self) -> APDU {
        let apdu = APDU::new(0x00, self.ins(), 0x00, 0x00);
        match self {
            CardCommand::Read => apdu.with_le(RECORD_SIZE as u16),
            CardCommand::Write(record) => apdu.with_data(record.to_vec()),
            CardCommand::VerifyPin(pin) => apdu.with_data(pin.to_vec()).with_le(RECORD_SIZE as u16),
            CardCommand::ChangePin { old, new } => {
                let mut data = Vec::with_capacity(2 * PIN_LENGTH);
                data.extend_from_slice(old);
                data.extend_from_slice(new);
                apdu.with_data(data)
            }
            CardCommand::GetPublicKey => apdu.with_le(RsaOperations::PUBLIC_KEY_SIZE as u16),
            CardCommand::SignChallenge(challenge) => apdu
                .with_data(challenge.to_vec())
                .with_le(RsaOperations::SIGNATURE_SIZE as u16),
            CardCommand::AdminUnlock => apdu,
            CardCommand::AdminResetPin(pin) => apdu.with_data(pin.to_vec()),
        }
    }

    /// Decode an incoming APDU
    ///
    /// The error is the status word to answer with: 6700 for a data field of
    /// the wrong size, 6D00 for an instruction the card does not know.
    pub fn from_apdu(apdu: &APDU) -> Result<Self, u16> {
        match apdu.ins {
            ins::READ => Ok(CardCommand::Read),
            ins::WRITE => Ok(CardCommand::Write(fixed(&apdu.data)?)),
            ins::VERIFY_PIN => Ok(CardCommand::VerifyPin(fixed(&apdu.data)?)),
            ins::CHANGE_PIN => {
                let both: [u8; 2 * PIN_LENGTH] = fixed(&apdu.data)?;
                let mut old = [0u8; PIN_LENGTH];
                let mut new = [0u8; PIN_LENGTH];
                old.copy_from_slice(&both[..PIN_LENGTH]);
                new.copy_from_slice(&both[PIN_LENGTH..]);
                Ok(CardCommand::ChangePin { old, new })
            }
            ins::GET_PUBLIC_KEY => Ok(CardCommand::GetPublicKey),
            ins::SIGN_CHALLENGE => Ok(CardCommand::SignChallenge(fixed(&apdu.data)?)),
            ins::ADMIN_UNLOCK => Ok(CardCommand::AdminUnlock),
            ins::ADMIN_RESET_PIN => Ok(CardCommand::AdminResetPin(fixed(&apdu.data)?)),
            _ => Err(SW::INS_NOT_SUPPORTED),
        }
    }
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], u16> {
    data.try_into().map_err(|_| SW::WRONG_LENGTH)
}

// PINs and record contents stay out of logs
impl fmt::Debug for CardCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
