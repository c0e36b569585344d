// ============================================
// File: crates/minivtun-core/src/crypto/keys.rs
// ============================================
//! # Key Types
//!
//! ## Creation Reason
//! Holds everything derived from the shared passphrase with the right
//! handling properties (zeroize on drop, redacted `Debug`, constant-time
//! comparison).
//!
//! ## Main Functionality
//! - `AuthDigest`: 16-byte tag carried in clear by every message
//! - `EncryptKey`: AES-128 encryption schedule + CBC IV
//! - `DecryptKey`: AES-128 decryption schedule + CBC IV
//!
//! ## ⚠️ Important Note for Next Developer
//! - Compare digests with `verify`, never with slice `==`
//! - Key schedules are built once at startup and never mutated
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::{Aes128Dec, Aes128Enc};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{AES_BLOCK_SIZE, AES_KEY_SIZE};
use crate::protocol::messages::AUTH_DIGEST_SIZE;

// ============================================
// AuthDigest
// ============================================

/// Passphrase digest used as the per-message authentication tag.
///
/// The value travels in clear, so it is not secret by itself, but it
/// is derived independently from the cipher key and reveals nothing
/// about it.
#[derive(Clone, Copy)]
pub struct AuthDigest([u8; AUTH_DIGEST_SIZE]);

impl AuthDigest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; AUTH_DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; AUTH_DIGEST_SIZE] {
        &self.0
    }

    /// Checks a received digest in constant time.
    #[must_use]
    pub fn verify(&self, received: &Self) -> bool {
        self.0.ct_eq(&received.0).into()
    }

    /// Short hex fingerprint for logs and diagnostics.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl PartialEq for AuthDigest {
    fn eq(&self, other: &Self) -> bool {
        self.verify(other)
    }
}

impl Eq for AuthDigest {}

impl fmt::Debug for AuthDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthDigest({}..)", self.fingerprint())
    }
}

// ============================================
// EncryptKey / DecryptKey
// ============================================

/// Encryption half of the tunnel cipher.
#[derive(Clone)]
pub struct EncryptKey {
    pub(crate) cipher: Aes128Enc,
    pub(crate) iv: [u8; AES_BLOCK_SIZE],
}

impl EncryptKey {
    /// Expands an AES-128 key into an encryption schedule.
    #[must_use]
    pub fn new(key: &[u8; AES_KEY_SIZE], iv: [u8; AES_BLOCK_SIZE]) -> Self {
        Self {
            cipher: Aes128Enc::new(GenericArray::from_slice(key)),
            iv,
        }
    }
}

impl Drop for EncryptKey {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl fmt::Debug for EncryptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material
        write!(f, "EncryptKey([REDACTED])")
    }
}

/// Decryption half of the tunnel cipher.
#[derive(Clone)]
pub struct DecryptKey {
    pub(crate) cipher: Aes128Dec,
    pub(crate) iv: [u8; AES_BLOCK_SIZE],
}

impl DecryptKey {
    /// Expands an AES-128 key into a decryption schedule.
    #[must_use]
    pub fn new(key: &[u8; AES_KEY_SIZE], iv: [u8; AES_BLOCK_SIZE]) -> Self {
        Self {
            cipher: Aes128Dec::new(GenericArray::from_slice(key)),
            iv,
        }
    }
}

impl Drop for DecryptKey {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl fmt::Debug for DecryptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptKey([REDACTED])")
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_verify() {
        let a = AuthDigest::from_bytes([1u8; AUTH_DIGEST_SIZE]);
        let b = AuthDigest::from_bytes([1u8; AUTH_DIGEST_SIZE]);
        let mut other = [1u8; AUTH_DIGEST_SIZE];
        other[15] = 2;
        let c = AuthDigest::from_bytes(other);

        assert!(a.verify(&b));
        assert!(!a.verify(&c));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let key = EncryptKey::new(&[7u8; AES_KEY_SIZE], [9u8; AES_BLOCK_SIZE]);
        assert_eq!(format!("{key:?}"), "EncryptKey([REDACTED])");

        let digest = AuthDigest::from_bytes([0xAB; AUTH_DIGEST_SIZE]);
        assert_eq!(format!("{digest:?}"), "AuthDigest(abababab..)");
    }
}
