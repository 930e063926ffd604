//! Session state for the membership applet
//!
//! Transient: cleared on deselect, reset and power loss. The AES key of the
//! last verified PIN lives only here.

use crate::crypto::PinKey;

/// Where the cardholder stands in the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// No PIN verified
    #[default]
    Idle,
    /// PIN verified; holds the key derived from it
    Authenticated(PinKey),
    /// Retry counter is zero; only an admin command gets out of here
    Locked,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Session::Locked)
    }

    /// Key derived from the verified PIN
    pub fn key(&self) -> Option<&PinKey> {
        match self {
            Session::Authenticated(key) => Some(key),
            _ => None,
        }
    }

    pub fn authenticate(&mut self, key: PinKey) {
        *self = Session::Authenticated(key);
    }

    /// Drop any authentication
    pub fn clear(&mut self) {
        *self = Session::Idle;
    }

    /// Follow the stored retry counter: zero means Locked, and a Locked
    /// session falls back to Idle once the counter is restored
    pub fn sync_with_retry_counter(&mut self, retries: u8) {
        if retries == 0 {
            *self = Session::Locked;
        } else if self.is_locked() {
            *self = Session::Idle;
        }
    }
}
