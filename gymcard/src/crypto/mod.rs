//! Cryptographic Operations
//!
//! Primitives used by the membership card: PIN hashing and key derivation,
//! the AES block protecting balance and expiry, and the RSA device key.

pub mod aes;
pub mod challenge;
pub mod hash;
pub mod pin;
pub mod rsa;

pub use self::aes::{AesError, AesOperations};
pub use self::challenge::{random_challenge, CHALLENGE_LENGTH};
pub use self::hash::{HashOperations, PinKey, PIN_HASH_SIZE};
pub use self::pin::{Pin, PinError, DEFAULT_PIN, PIN_LENGTH};
pub use self::rsa::{ChallengeSigner, RsaError, RsaOperations, RsaSha1Signer};
