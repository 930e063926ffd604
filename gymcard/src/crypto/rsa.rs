//! RSA Operations
//!
//! The card's device-authentication key: RSA-1024 generation, the 131-byte
//! public key wire format, PKCS#1 v1.5 / SHA-1 challenge signatures, and
//! PKCS#1 / SPKI encodings for storage and for external verifiers.

use log::debug;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;

use super::hash::HashOperations;

/// RSA operation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RsaError {
    #[error("RSA key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("RSA signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid RSA key: {0}")]
    InvalidKey(String),

    #[error("RSA key encoding failed: {0}")]
    EncodingFailed(String),
}

/// Something on the card that can answer an authentication challenge
///
/// The applet only ever talks to this trait, so the signature scheme can be
/// swapped without touching the command dispatcher.
pub trait ChallengeSigner: Send {
    /// Public key in the card's wire format
    fn public_key_bytes(&self) -> Result<Vec<u8>, RsaError>;

    /// Sign a challenge
    fn sign(&self, challenge: &[u8]) -> Result<Vec<u8>, RsaError>;
}

/// RSASSA-PKCS1-v1_5 with SHA-1 over an RSA-1024 key
pub struct RsaSha1Signer {
    key: RsaPrivateKey,
}

impl RsaSha1Signer {
    /// Generate a fresh RSA-1024 key
    pub fn generate() -> Result<Self, RsaError> {
        Ok(Self::from_private_key(RsaOperations::generate_private_key()?))
    }

    pub fn from_private_key(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Load a key from its PKCS#1 DER encoding
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, RsaError> {
        Ok(Self::from_private_key(RsaOperations::private_key_from_der(der)?))
    }

    /// PKCS#1 DER encoding of the private key, for the card store
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>, RsaError> {
        RsaOperations::private_key_to_der(&self.key)
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.key)
    }
}

impl ChallengeSigner for RsaSha1Signer {
    fn public_key_bytes(&self) -> Result<Vec<u8>, RsaError> {
        RsaOperations::export_public_key(&self.public_key())
    }

    fn sign(&self, challenge: &[u8]) -> Result<Vec<u8>, RsaError> {
        RsaOperations::sign_sha1(&self.key, challenge)
    }
}

/// RSA Operations
pub struct RsaOperations;

impl RsaOperations {
    /// Key size of the card's authentication key
    pub const KEY_BITS: usize = 1024;

    /// Modulus bytes in the wire format
    pub const MODULUS_SIZE: usize = 128;

    /// Exponent bytes in the wire format
    pub const EXPONENT_SIZE: usize = 3;

    /// Exported public key: modulus(128) ‖ exponent(3)
    pub const PUBLIC_KEY_SIZE: usize = Self::MODULUS_SIZE + Self::EXPONENT_SIZE;

    /// Signature bytes for a 1024-bit key
    pub const SIGNATURE_SIZE: usize = 128;

    /// Generate a new RSA-1024 private key
    pub fn generate_private_key() -> Result<RsaPrivateKey, RsaError> {
        debug!("Generating RSA-{} keypair", Self::KEY_BITS);

        RsaPrivateKey::new(&mut OsRng, Self::KEY_BITS)
            .map_err(|e| RsaError::KeyGenerationFailed(e.to_string()))
    }

    /// Encode the public key as modulus(128) ‖ exponent(3), both big-endian
    /// and left-padded with zeros
    pub fn export_public_key(key: &RsaPublicKey) -> Result<Vec<u8>, RsaError> {
        let n = key.n().to_bytes_be();
        let e = key.e().to_bytes_be();
        if n.len() > Self::MODULUS_SIZE || e.len() > Self::EXPONENT_SIZE {
            return Err(RsaError::InvalidKey(format!(
                "key does not fit the {}-byte export format",
                Self::PUBLIC_KEY_SIZE
            )));
        }

        let mut data = vec![0u8; Self::PUBLIC_KEY_SIZE];
        data[Self::MODULUS_SIZE - n.len()..Self::MODULUS_SIZE].copy_from_slice(&n);
        data[Self::PUBLIC_KEY_SIZE - e.len()..].copy_from_slice(&e);
        Ok(data)
    }

    /// Parse modulus(128) ‖ exponent(3) as unsigned big integers
    ///
    /// Bytes past the first 131 are ignored.
    pub fn parse_public_key(data: &[u8]) -> Result<RsaPublicKey, RsaError> {
        if data.len() < Self::PUBLIC_KEY_SIZE {
            return Err(RsaError::InvalidKey(format!(
                "expected {} bytes, got {}",
                Self::PUBLIC_KEY_SIZE,
                data.len()
            )));
        }

        let n = BigUint::from_bytes_be(&data[..Self::MODULUS_SIZE]);
        let e = BigUint::from_bytes_be(&data[Self::MODULUS_SIZE..Self::PUBLIC_KEY_SIZE]);
        RsaPublicKey::new(n, e).map_err(|e| RsaError::InvalidKey(e.to_string()))
    }

    /// RSASSA-PKCS1-v1_5 signature over SHA-1(message)
    pub fn sign_sha1(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, RsaError> {
        let hashed = HashOperations::sha1(message);
        key.sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha1>(), &hashed)
            .map_err(|e| RsaError::SigningFailed(e.to_string()))
    }

    /// Verify an RSASSA-PKCS1-v1_5 / SHA-1 signature
    ///
    /// Any failure, including a malformed signature, is just `false`.
    pub fn verify_signature(message: &[u8], signature: &[u8], key: &RsaPublicKey) -> bool {
        let hashed = HashOperations::sha1(message);
        key.verify(Pkcs1v15Sign::new::<Sha1>(), &hashed, signature)
            .is_ok()
    }

    /// SubjectPublicKeyInfo DER encoding
    pub fn public_key_to_der(key: &RsaPublicKey) -> Result<Vec<u8>, RsaError> {
        key.to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| RsaError::EncodingFailed(e.to_string()))
    }

    /// SubjectPublicKeyInfo PEM encoding (`-----BEGIN PUBLIC KEY-----`)
    pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, RsaError> {
        key.to_public_key_pem(LineEnding::LF)
            .map_err(|e| RsaError::EncodingFailed(e.to_string()))
    }

    /// PKCS#1 DER encoding of a private key
    pub fn private_key_to_der(key: &RsaPrivateKey) -> Result<Vec<u8>, RsaError> {
        key.to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| RsaError::EncodingFailed(e.to_string()))
    }

    /// Decode a PKCS#1 DER private key
    pub fn private_key_from_der(der: &[u8]) -> Result<RsaPrivateKey, RsaError> {
        RsaPrivateKey::from_pkcs1_der(der).map_err(|e| RsaError::InvalidKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static TEST_KEY: Lazy<RsaPrivateKey> =
        Lazy::new(|| RsaOperations::generate_private_key().unwrap());

    fn signer() -> RsaSha1Signer {
        RsaSha1Signer::from_private_key(TEST_KEY.clone())
    }

    #[test]
    fn test_export_public_key_layout() {
        let signer = signer();
        let exported = signer.public_key_bytes().unwrap();
        assert_eq!(exported.len(), RsaOperations::PUBLIC_KEY_SIZE);

        // Default public exponent 65537 = 01 00 01
        assert_eq!(&exported[128..], &[0x01, 0x00, 0x01]);

        let parsed = RsaOperations::parse_public_key(&exported).unwrap();
        assert_eq!(parsed, signer.public_key());
    }

    #[test]
    fn test_parse_public_key_too_short() {
        let result = RsaOperations::parse_public_key(&[0u8; 130]);
        assert!(matches!(result, Err(RsaError::InvalidKey(_))));
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer();
        let challenge = [0x5Au8; 32];

        let signature = signer.sign(&challenge).unwrap();
        assert_eq!(signature.len(), RsaOperations::SIGNATURE_SIZE);

        let public = RsaOperations::parse_public_key(&signer.public_key_bytes().unwrap()).unwrap();
        assert!(RsaOperations::verify_signature(&challenge, &signature, &public));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signer = signer();
        let challenge = [0x11u8; 32];
        let mut signature = signer.sign(&challenge).unwrap();
        let public = signer.public_key();

        assert!(!RsaOperations::verify_signature(&[0x12u8; 32], &signature, &public));

        signature[10] ^= 0xFF;
        assert!(!RsaOperations::verify_signature(&challenge, &signature, &public));

        assert!(!RsaOperations::verify_signature(&challenge, &[0u8; 3], &public));
    }

    #[test]
    fn test_pkcs1_der_roundtrip() {
        let signer = signer();
        let der = signer.to_pkcs1_der().unwrap();
        let restored = RsaSha1Signer::from_pkcs1_der(&der).unwrap();
        assert_eq!(restored.public_key(), signer.public_key());

        assert!(RsaSha1Signer::from_pkcs1_der(&[0x30, 0x00]).is_err());
    }

    #[test]
    fn test_public_key_encodings() {
        let public = signer().public_key();

        let pem = RsaOperations::public_key_to_pem(&public).unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let der = RsaOperations::public_key_to_der(&public).unwrap();
        // SEQUENCE
        assert_eq!(der[0], 0x30);
    }
}
