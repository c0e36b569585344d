// ============================================
// File: crates/minivtun-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation Functions
//!
//! ## Creation Reason
//! Turns the shared passphrase into the authentication digest and the
//! cipher key schedules, with no handshake between the endpoints.
//!
//! ## Main Functionality
//! - `derive_auth_digest`: 16-byte per-message tag
//! - `derive_schedules`: AES-128 encrypt/decrypt schedules + CBC IV
//!
//! ## Derivation
//! ```text
//! prk    = HKDF-Extract(salt = "minivtun-v1", ikm = passphrase)
//! digest = HKDF-Expand(prk, "minivtun auth digest", 16)
//! key    = HKDF-Expand(prk, "minivtun cipher key",  16)
//! iv     = HKDF-Expand(prk, "minivtun cipher iv",   16)
//! ```
//! Distinct info labels keep the clear-text digest unrelated to the key.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Changing a label or the salt breaks compatibility with every peer
//! - Identical passphrases MUST yield identical output on both ends
//!
//! ## Last Modified
//! v0.1.0 - Initial passphrase KDF

use hkdf::Hkdf;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroize;

use super::keys::{AuthDigest, DecryptKey, EncryptKey};
use super::{AES_BLOCK_SIZE, AES_KEY_SIZE, HKDF_SALT, INFO_AUTH_DIGEST, INFO_CIPHER_IV, INFO_CIPHER_KEY};
use crate::error::{CoreError, Result};
use crate::protocol::messages::AUTH_DIGEST_SIZE;

// ============================================
// Passphrase Derivation
// ============================================

/// Derives the authentication digest of a passphrase.
///
/// An empty passphrase is valid and yields a fixed, well-known digest.
///
/// # Errors
/// `KeyDerivation` if HKDF expansion fails (not reachable for 16 bytes).
pub fn derive_auth_digest(passphrase: &[u8]) -> Result<AuthDigest> {
    let mut out = [0u8; AUTH_DIGEST_SIZE];
    expand_into(passphrase, INFO_AUTH_DIGEST, &mut out)?;
    Ok(AuthDigest::from_bytes(out))
}

/// Derives the encryption and decryption key schedules of a passphrase.
///
/// # Errors
/// `KeyDerivation` if HKDF expansion fails.
pub fn derive_schedules(passphrase: &[u8]) -> Result<(EncryptKey, DecryptKey)> {
    let mut key = [0u8; AES_KEY_SIZE];
    let mut iv = [0u8; AES_BLOCK_SIZE];

    let derived = expand_into(passphrase, INFO_CIPHER_KEY, &mut key)
        .and_then(|()| expand_into(passphrase, INFO_CIPHER_IV, &mut iv));

    let schedules = derived.map(|()| (EncryptKey::new(&key, iv), DecryptKey::new(&key, iv)));

    key.zeroize();
    iv.zeroize();

    if schedules.is_ok() {
        debug!("Derived AES-128-CBC key schedules from passphrase");
    }
    schedules
}

fn expand_into(passphrase: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), passphrase);
    hk.expand(info, out)
        .map_err(|_| CoreError::key_derivation(format!("HKDF expansion failed for {} bytes", out.len())))
}

// ============================================
// Tests
// ============================================
