// ============================================
// File: crates/minivtun-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes everything derived from the shared passphrase, using
//! RustCrypto implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: `AuthDigest`, `EncryptKey`, `DecryptKey`
//! - [`kdf`]: HKDF-SHA256 passphrase derivation
//! - [`cipher`]: AES-128-CBC in-place payload transform
//!
//! ## Cryptographic Design
//! ```text
//!   passphrase ──► HKDF-SHA256 ──┬──► auth digest (clear, every message)
//!                                ├──► AES-128 key ──► encrypt / decrypt schedule
//!                                └──► CBC IV
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own primitives
//! - Key material is zeroized on drop and never logged
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod cipher;
pub mod kdf;
pub mod keys;

pub use cipher::{decrypt_in_place, encrypt_in_place};
pub use kdf::{derive_auth_digest, derive_schedules};
pub use keys::{AuthDigest, DecryptKey, EncryptKey};

// ============================================
// Constants
// ============================================

/// AES block size in bytes; payloads are padded to a multiple of this.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes.
pub const AES_KEY_SIZE: usize = 16;

/// HKDF salt for all passphrase derivations.
pub const HKDF_SALT: &[u8] = b"minivtun-v1";

/// HKDF info label for the authentication digest.
pub const INFO_AUTH_DIGEST: &[u8] = b"minivtun auth digest";

/// HKDF info label for the cipher key.
pub const INFO_CIPHER_KEY: &[u8] = b"minivtun cipher key";

/// HKDF info label for the CBC IV.
pub const INFO_CIPHER_IV: &[u8] = b"minivtun cipher iv";
