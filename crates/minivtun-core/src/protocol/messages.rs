// ============================================
// File: crates/minivtun-core/src/protocol/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines the messages exchanged between the two tunnel endpoints.
//!
//! ## Main Functionality
//! - `Opcode`: one-byte message discriminator
//! - `IpProtocol`: protocol tag of an embedded packet
//! - `IpData`, `Message`, `TunnelMessage`: decoded message forms
//!
//! ## Wire Format (Network Byte Order)
//! ```text
//! ┌──────────────────────┬────────┬──────────┬──────────┬─────────────────┐
//! │ auth_digest (16)     │ op (1) │ proto(2) │ len (2)  │ packet (≤ 8192) │
//! └──────────────────────┴────────┴──────────┴──────────┴─────────────────┘
//!   every message ───────────────┘ └──────── IPDATA only ────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field order is the wire contract, do not reorder
//! - Opcode values are shared with deployed peers
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use bytes::Bytes;

use crate::crypto::AuthDigest;
use crate::error::{CoreError, Result};

// ============================================
// Size Constants
// ============================================

/// Size of the passphrase digest carried by every message.
pub const AUTH_DIGEST_SIZE: usize = 16;

/// Digest plus opcode.
pub const BASIC_HEADER_SIZE: usize = AUTH_DIGEST_SIZE + 1;

/// Basic header plus protocol id and length.
pub const IPDATA_HEADER_SIZE: usize = BASIC_HEADER_SIZE + 4;

/// Largest embedded packet a message can carry.
pub const MAX_IPDATA_SIZE: usize = 8192;

/// Smallest valid IPv4 packet (fixed header).
pub const IPV4_MIN_PACKET_SIZE: usize = 20;

/// Smallest valid IPv6 packet (fixed header).
pub const IPV6_MIN_PACKET_SIZE: usize = 40;

// ============================================
// Opcode
// ============================================

/// Message opcode.
///
/// | Value | Opcode |
/// |-------|--------|
/// | 0x00 | Noop (keepalive) |
/// | 0x01 | IpData |
/// | 0x02 | Disconnect |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Keepalive, no payload.
    Noop = 0x00,
    /// Carries one IP packet.
    IpData = 0x01,
    /// Sender is tearing the link down.
    Disconnect = 0x02,
}

impl Opcode {
    /// Converts a byte to an `Opcode`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Noop),
            0x01 => Some(Self::IpData),
            0x02 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_byte(value).ok_or(CoreError::UnknownOpcode(value))
    }
}

// ============================================
// IpProtocol
// ============================================

/// Protocol tag of an embedded packet (an Ethernet protocol number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IpProtocol {
    /// `ETH_P_IP`
    Ipv4 = 0x0800,
    /// `ETH_P_IPV6`
    Ipv6 = 0x86DD,
}

impl IpProtocol {
    /// Converts a wire value to an `IpProtocol`.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(Self::Ipv4),
            0x86DD => Some(Self::Ipv6),
            _ => None,
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Identifies the protocol from the version nibble of a raw IP packet.
    ///
    /// # Errors
    /// `MessageTooShort` for an empty packet, `MalformedMessage` for a
    /// version other than 4 or 6.
    pub fn from_packet(packet: &[u8]) -> Result<Self> {
        let first = *packet.first().ok_or(CoreError::too_short(1, 0))?;
        match first >> 4 {
            4 => Ok(Self::Ipv4),
            6 => Ok(Self::Ipv6),
            version => Err(CoreError::malformed(format!(
                "unsupported IP version {version}"
            ))),
        }
    }

    /// Smallest packet that can be valid for this protocol.
    #[must_use]
    pub const fn min_packet_len(self) -> usize {
        match self {
            Self::Ipv4 => IPV4_MIN_PACKET_SIZE,
            Self::Ipv6 => IPV6_MIN_PACKET_SIZE,
        }
    }
}

// ============================================
// Messages
// ============================================

/// Payload of an `IPDATA` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpData {
    /// Protocol of the embedded packet.
    pub protocol: IpProtocol,
    /// The embedded packet, exactly `length` bytes.
    pub packet: Bytes,
}

impl IpData {
    /// Wraps a raw IP packet, tagging it from its version nibble.
    ///
    /// # Errors
    /// Returns an error if the version nibble is not 4 or 6.
    pub fn from_packet(packet: Bytes) -> Result<Self> {
        let protocol = IpProtocol::from_packet(&packet)?;
        Ok(Self { protocol, packet })
    }
}

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keepalive.
    Noop,
    /// Tunnelled packet.
    IpData(IpData),
    /// Link teardown notice.
    Disconnect,
}

impl Message {
    /// Returns the opcode of this message.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Noop => Opcode::Noop,
            Self::IpData(_) => Opcode::IpData,
            Self::Disconnect => Opcode::Disconnect,
        }
    }
}

/// A full message as carried in one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelMessage {
    /// Passphrase digest from the header.
    pub digest: AuthDigest,
    /// Message body.
    pub message: Message,
}

impl TunnelMessage {
    /// Creates a message.
    #[must_use]
    pub const fn new(digest: AuthDigest, message: Message) -> Self {
        Self { digest, message }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(Opcode::from_byte(0x00), Some(Opcode::Noop));
        assert_eq!(Opcode::from_byte(0x02), Some(Opcode::Disconnect));
        assert_eq!(Opcode::from_byte(0x03), None);
        assert_eq!(Opcode::IpData.as_byte(), 0x01);

        assert_eq!(Opcode::try_from(0x07), Err(CoreError::UnknownOpcode(0x07)));
    }

    #[test]
    fn test_protocol_from_packet() {
        assert_eq!(IpProtocol::from_packet(&[0x45, 0]).unwrap(), IpProtocol::Ipv4);
        assert_eq!(IpProtocol::from_packet(&[0x60, 0]).unwrap(), IpProtocol::Ipv6);
        assert!(IpProtocol::from_packet(&[0x10]).is_err());
        assert!(IpProtocol::from_packet(&[]).is_err());
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(BASIC_HEADER_SIZE, 17);
        assert_eq!(IPDATA_HEADER_SIZE, 21);
        assert_eq!(IpProtocol::Ipv6.min_packet_len(), 40);
    }
}
