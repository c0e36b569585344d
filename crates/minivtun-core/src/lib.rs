// ============================================
// File: crates/minivtun-core/src/lib.rs
// ============================================
//! # minivtun Core - Protocol & Cryptography Library
//!
//! ## Creation Reason
//! Provides the wire protocol and passphrase cryptography of the
//! minivtun point-to-point tunnel, free of any I/O.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Message definitions (`NOOP`, `IPDATA`, `DISCONNECT`)
//! - Binary codec with length and capacity validation
//!
//! ### Crypto Module ([`crypto`])
//! - Passphrase digest and key schedules (HKDF-SHA256)
//! - Payload transform (AES-128-CBC)
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    minivtun                         │
//! │                       │                             │
//! │         ┌─────────────┴─────────────┐               │
//! │         ▼                           ▼               │
//! │   minivtun-core  ◄──        minivtun-transport      │
//! │   You are here                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every function here is pure; keep I/O out of this crate
//! - Wire changes break interoperability with running peers
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

// Re-export commonly used items
pub use crypto::{AuthDigest, DecryptKey, EncryptKey};
pub use error::{CoreError, Result};
pub use protocol::{IpData, IpProtocol, Message, Opcode, ProtocolCodec, TunnelMessage};
