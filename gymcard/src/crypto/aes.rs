//! AES Operations
//!
//! AES-128-ECB over the single 16-byte block holding balance and expiry.
//!
//! There is no IV, no padding scheme and no MAC. Decrypting with the wrong key
//! succeeds and yields garbage numbers; callers cannot tell a wrong PIN from a
//! valid record by looking at the plaintext.

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use thiserror::Error;

/// AES operation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AesError {
    #[error("Invalid key length: expected 16, got {0}")]
    InvalidKey(usize),

    #[error("Invalid block length: expected 16, got {0}")]
    InvalidData(usize),
}

/// AES-128 Operations
pub struct AesOperations;

impl AesOperations {
    /// Block size for AES
    pub const BLOCK_SIZE: usize = 16;

    /// Key size for AES-128
    pub const KEY_SIZE: usize = 16;

    /// Encrypt a single block with AES-128-ECB
    pub fn encrypt_raw_block(key: &[u8], plaintext: &[u8]) -> Result<[u8; 16], AesError> {
        let cipher = Self::cipher(key)?;
        if plaintext.len() != Self::BLOCK_SIZE {
            return Err(AesError::InvalidData(plaintext.len()));
        }

        let mut block = GenericArray::clone_from_slice(plaintext);
        cipher.encrypt_block(&mut block);
        Ok(block.into())
    }

    /// Decrypt a single block with AES-128-ECB
    pub fn decrypt_raw_block(key: &[u8], ciphertext: &[u8]) -> Result<[u8; 16], AesError> {
        let cipher = Self::cipher(key)?;
        if ciphertext.len() != Self::BLOCK_SIZE {
            return Err(AesError::InvalidData(ciphertext.len()));
        }

        let mut block = GenericArray::clone_from_slice(ciphertext);
        cipher.decrypt_block(&mut block);
        Ok(block.into())
    }

    /// Encrypt balance and expiry into the card's 16-byte block
    ///
    /// Plaintext layout: BE(balance) ‖ BE(expiry) ‖ 10 zero bytes.
    pub fn encrypt_block(balance: i32, expiry: i16, key: &[u8]) -> Result<[u8; 16], AesError> {
        let mut plaintext = [0u8; 16];
        plaintext[0..4].copy_from_slice(&balance.to_be_bytes());
        plaintext[4..6].copy_from_slice(&expiry.to_be_bytes());
        Self::encrypt_raw_block(key, &plaintext)
    }

    /// Decrypt the card's 16-byte block back into (balance, expiry)
    ///
    /// Never detects a wrong key.
    pub fn decrypt_block(ciphertext: &[u8], key: &[u8]) -> Result<(i32, i16), AesError> {
        let plaintext = Self::decrypt_raw_block(key, ciphertext)?;
        Ok(Self::split_plaintext(&plaintext))
    }

    /// Read (balance, expiry) from a plaintext block
    pub fn split_plaintext(plaintext: &[u8; 16]) -> (i32, i16) {
        let balance = i32::from_be_bytes([plaintext[0], plaintext[1], plaintext[2], plaintext[3]]);
        let expiry = i16::from_be_bytes([plaintext[4], plaintext[5]]);
        (balance, expiry)
    }

    fn cipher(key: &[u8]) -> Result<Aes128, AesError> {
        if key.len() != Self::KEY_SIZE {
            return Err(AesError::InvalidKey(key.len()));
        }
        Ok(Aes128::new(GenericArray::from_slice(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HashOperations;
    use rand::Rng;

    #[test]
    fn test_fips197_vector() {
        // FIPS-197 appendix C.1
        let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let plaintext = hex::decode("00112233445566778899aabbccddeeff").unwrap();

        let ciphertext = AesOperations::encrypt_raw_block(&key, &plaintext).unwrap();
        assert_eq!(hex::encode(ciphertext), "69c4e0d86a7b0430d8cdb78070b4c55a");

        let decrypted = AesOperations::decrypt_raw_block(&key, &ciphertext).unwrap();
        assert_eq!(decrypted.to_vec(), plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_sensitive_block() {
        let mut rng = rand::thread_rng();
        let mut pins = vec!["000000".to_string(), "123456".to_string(), "999999".to_string()];
        pins.extend((0..4).map(|_| format!("{:06}", rng.gen_range(0..1_000_000))));

        for pin in &pins {
            let key = HashOperations::derive_key(pin.as_bytes());
            for (balance, expiry) in [(0, 0), (500_000, 30), (-1, -1), (i32::MAX, i16::MIN), (i32::MIN, i16::MAX)] {
                let block = AesOperations::encrypt_block(balance, expiry, key.as_bytes()).unwrap();
                let decoded = AesOperations::decrypt_block(&block, key.as_bytes()).unwrap();
                assert_eq!(decoded, (balance, expiry), "pin {}", pin);
            }
        }
    }

    #[test]
    fn test_plaintext_padding_is_zero() {
        let key = HashOperations::derive_key(b"123456");
        let block = AesOperations::encrypt_block(0x01020304, 0x0506, key.as_bytes()).unwrap();
        let plaintext = AesOperations::decrypt_raw_block(key.as_bytes(), &block).unwrap();
        assert_eq!(&plaintext[..6], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert!(plaintext[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_key_decrypts_without_error() {
        let right = HashOperations::derive_key(b"123456");
        let wrong = HashOperations::derive_key(b"654321");
        let block = AesOperations::encrypt_block(500_000, 30, right.as_bytes()).unwrap();

        let result = AesOperations::decrypt_block(&block, wrong.as_bytes());
        assert!(result.is_ok());
        assert_ne!(result.unwrap(), (500_000, 30));
    }

    #[test]
    fn test_invalid_key_length() {
        let result = AesOperations::encrypt_block(1, 1, &[0x01u8; 24]);
        assert_eq!(result, Err(AesError::InvalidKey(24)));
    }

    #[test]
    fn test_invalid_block_length() {
        let key = [0x01u8; 16];
        let result = AesOperations::decrypt_raw_block(&key, &[0u8; 15]);
        assert_eq!(result, Err(AesError::InvalidData(15)));
    }
}
