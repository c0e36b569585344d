// ============================================
// File: crates/minivtun-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines the per-packet error taxonomy of the tunnel protocol: what can
//! go wrong while decoding, authenticating, or transforming one datagram.
//!
//! ## Main Functionality
//! - `CoreError`: Primary error enum for codec and crypto operations
//! - Classification helpers used by the relay to pick a log level
//!
//! ## Error Categories
//! 1. **Format Errors**: truncated datagram, unknown opcode or protocol,
//!    declared length inconsistent with the buffer
//! 2. **Authentication Failures**: digest mismatch
//! 3. **Capacity Errors**: payload above the configured maximum
//! 4. **Crypto Errors**: key derivation, misaligned cipher input
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every variant here is recovered locally: the datagram is dropped
//! - NEVER include key material or passphrases in error messages
//! - Nothing here is ever reported back to the remote peer
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Errors raised while encoding, decoding, authenticating or
/// transforming a tunnel message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // ========================================
    // Format Errors
    // ========================================

    /// Datagram is shorter than the header it claims to carry.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Message is internally inconsistent.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    /// Unknown opcode byte.
    #[error("Unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Unknown embedded protocol tag.
    #[error("Unknown protocol id: 0x{0:04x}")]
    UnknownProtocol(u16),

    // ========================================
    // Authentication
    // ========================================

    /// Digest in the header does not match the local passphrase.
    #[error("Authentication failed: digest mismatch")]
    AuthenticationFailed,

    // ========================================
    // Capacity
    // ========================================

    /// Payload exceeds the configured maximum.
    #[error("Payload too large: max {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Declared or actual size
        actual: usize,
    },

    // ========================================
    // Crypto Errors
    // ========================================

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    /// Cipher input is not a whole number of blocks.
    #[error("Cipher input of {len} bytes is not a multiple of {block} bytes")]
    BlockAlignment {
        /// Buffer length
        len: usize,
        /// Cipher block size
        block: usize,
    },
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `PayloadTooLarge` error.
    #[must_use]
    pub const fn too_large(max: usize, actual: usize) -> Self {
        Self::PayloadTooLarge { max, actual }
    }

    /// Creates a `KeyDerivation` error.
    pub fn key_derivation(reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for malformed or truncated input.
    #[must_use]
    pub const fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::MessageTooShort { .. }
                | Self::MalformedMessage { .. }
                | Self::UnknownOpcode(_)
                | Self::UnknownProtocol(_)
        )
    }

    /// Returns `true` when a declared length exceeds the payload capacity.
    #[must_use]
    pub const fn is_capacity_error(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. })
    }

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::KeyDerivation { .. } | Self::BlockAlignment { .. }
        )
    }

    /// Returns `true` if this error might indicate a probing or spoofing peer.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }
}

// ============================================
// Tests
// ============================================
