//! PIN Manager for the membership applet
//!
//! PIN comparison and retry counter bookkeeping on the stored record.

use subtle::ConstantTimeEq;

use crate::card::record::{RawRecord, MAX_PIN_RETRY};
use crate::crypto::HashOperations;

/// Outcome of presenting a PIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCheck {
    /// Hash matched; the counter is left for the caller to reset
    Verified,
    /// Hash did not match; the counter was decremented
    Mismatch { retries_left: u8 },
    /// Counter was already zero; nothing was compared
    Blocked,
}

pub struct PINManager;

impl PINManager {
    /// Compare `pin` against the stored hash in constant time
    pub fn matches(record: &RawRecord, pin: &[u8]) -> bool {
        let hash = HashOperations::hash_pin(pin);
        hash[..].ct_eq(record.pin_hash()).into()
    }

    /// Check a PIN against the record, charging one attempt on a mismatch
    pub fn check(record: &mut RawRecord, pin: &[u8]) -> PinCheck {
        let retries = record.retry_counter();
        if retries == 0 {
            return PinCheck::Blocked;
        }

        if Self::matches(record, pin) {
            PinCheck::Verified
        } else {
            let retries_left = retries - 1;
            record.set_retry_counter(retries_left);
            PinCheck::Mismatch { retries_left }
        }
    }

    /// Restore the counter to its maximum
    pub fn reset_retries(record: &mut RawRecord) {
        record.set_retry_counter(MAX_PIN_RETRY);
    }

    /// Store the hash of `pin` as the new PIN
    pub fn set_pin(record: &mut RawRecord, pin: &[u8]) {
        record.set_pin_hash(&HashOperations::hash_pin(pin));
    }
}
