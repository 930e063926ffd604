//! Authentication challenges

use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes in a device-authentication challenge
pub const CHALLENGE_LENGTH: usize = 32;

/// Fresh challenge from the OS CSPRNG. One per authentication attempt.
pub fn random_challenge() -> [u8; CHALLENGE_LENGTH] {
    let mut challenge = [0u8; CHALLENGE_LENGTH];
    OsRng.fill_bytes(&mut challenge);
    challenge
}
