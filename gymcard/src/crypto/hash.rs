//! Hash Operations
//!
//! SHA-256 for PIN hashing and PIN-to-key derivation, SHA-1 for the
//! challenge signature digest.
//!
//! The PIN hash stored on the card and the AES key protecting the balance are
//! the *same* 16 bytes: SHA-256 over the ASCII PIN, truncated. Anyone who reads
//! the PIN hash off the card therefore holds the key for the encrypted block.
//! The wire format depends on this, so both functions stay identical.

use std::fmt;

use digest::Digest;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bytes of the SHA-256 digest kept for the PIN hash and the AES key
pub const PIN_HASH_SIZE: usize = 16;

/// AES-128 key derived from a PIN
///
/// Wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PinKey([u8; PIN_HASH_SIZE]);

impl PinKey {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PIN_HASH_SIZE] {
        &self.0
    }
}

impl fmt::Debug for PinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinKey(..)")
    }
}

/// Digests used by the card
pub struct HashOperations;

impl HashOperations {
    /// SHA-1 digest signed by the device key
    pub fn sha1(data: &[u8]) -> Vec<u8> {
        Sha1::digest(data).to_vec()
    }

    /// PIN hash as stored on the card: first 16 bytes of SHA-256(PIN)
    pub fn hash_pin(pin: &[u8]) -> [u8; PIN_HASH_SIZE] {
        Self::truncated_sha256(pin)
    }

    /// AES-128 key for the encrypted block: first 16 bytes of SHA-256(PIN)
    pub fn derive_key(pin: &[u8]) -> PinKey {
        PinKey(Self::truncated_sha256(pin))
    }

    fn truncated_sha256(data: &[u8]) -> [u8; PIN_HASH_SIZE] {
        let digest = Sha256::digest(data);
        let mut out = [0u8; PIN_HASH_SIZE];
        out.copy_from_slice(&digest[..PIN_HASH_SIZE]);
        out
    }
}
