// ============================================
// File: crates/minivtun-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Main Functionality
//! - [`messages`]: opcodes, protocol tags, message types and wire sizes
//! - [`codec`]: binary encode/decode with length validation
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol module

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_message, Codec, ProtocolCodec};
pub use messages::{
    IpData, IpProtocol, Message, Opcode, TunnelMessage, AUTH_DIGEST_SIZE, BASIC_HEADER_SIZE,
    IPDATA_HEADER_SIZE, MAX_IPDATA_SIZE,
};
