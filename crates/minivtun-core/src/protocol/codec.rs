// ============================================
// File: crates/minivtun-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Provides binary serialization and deserialization for tunnel
//! messages, with every length checked before a byte is copied.
//!
//! ## Main Functionality
//! - `Codec` trait: Generic encode/decode interface
//! - `ProtocolCodec`: Implementation for `TunnelMessage`
//! - Header peeking so the packet handler can authenticate and
//!   decrypt in place before the final decode
//!
//! ## Wire Format
//! All multi-byte integers are big-endian (network byte order).
//!
//! ## Parsing Strategy
//! 1. Check the basic header length (digest + opcode)
//! 2. Read the opcode
//! 3. For `IPDATA`: protocol tag, declared length against the remaining
//!    buffer, then against the payload capacity, then the padded span
//! 4. Check the embedded packet against its protocol's minimum size
//!
//! ## ⚠️ Important Note for Next Developer
//! - The declared `length` is authoritative, padding is never returned
//! - A rejected datagram must not produce partial output
//! - Keep `payload_span` and `decode` validating the same way
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::ops::Range;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::AuthDigest;
use crate::error::{CoreError, Result};
use crate::protocol::messages::{
    IpData, IpProtocol, Message, Opcode, TunnelMessage, AUTH_DIGEST_SIZE,
    BASIC_HEADER_SIZE, IPDATA_HEADER_SIZE, MAX_IPDATA_SIZE,
};

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    ///
    /// # Errors
    /// Returns an error if the message cannot be represented on the wire.
    fn encode(&self, msg: &T, buf: &mut BytesMut) -> Result<()>;

    /// Decodes a message from bytes, consuming them.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid message.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// IPDATA header view
// ============================================

/// Validated view of an `IPDATA` header inside a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IpDataHeader {
    protocol: IpProtocol,
    length: usize,
    span: usize,
}

// ============================================
// ProtocolCodec
// ============================================

/// Codec for tunnel messages.
///
/// # Capacity
/// `max_payload` bounds the embedded packet on both encode and decode.
/// It is normally the configured MTU and never exceeds
/// [`MAX_IPDATA_SIZE`].
///
/// # Block alignment
/// With alignment set (encryption enabled), the payload is zero-padded
/// on the wire to a multiple of the block size while `length` keeps the
/// real packet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCodec {
    max_payload: usize,
    block_align: Option<usize>,
}

impl ProtocolCodec {
    /// Creates a codec with the given payload capacity and no alignment.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_IPDATA_SIZE),
            block_align: None,
        }
    }

    /// Pads payloads to a multiple of `block` bytes.
    #[must_use]
    pub fn with_block_alignment(mut self, block: usize) -> Self {
        self.block_align = (block > 1).then_some(block);
        self
    }

    /// Returns the payload capacity.
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Returns the on-wire size of a payload of `len` bytes.
    #[must_use]
    pub fn padded_len(&self, len: usize) -> usize {
        match self.block_align {
            Some(block) => len.div_ceil(block) * block,
            None => len,
        }
    }

    /// Returns the encoded size of a message body.
    #[must_use]
    pub fn encoded_len(&self, message: &Message) -> usize {
        match message {
            Message::IpData(data) => IPDATA_HEADER_SIZE + self.padded_len(data.packet.len()),
            Message::Noop | Message::Disconnect => BASIC_HEADER_SIZE,
        }
    }

    /// Reads the digest from a raw datagram without consuming it.
    ///
    /// # Errors
    /// `MessageTooShort` if the basic header is incomplete.
    pub fn peek_digest(buf: &[u8]) -> Result<AuthDigest> {
        if buf.len() < BASIC_HEADER_SIZE {
            return Err(CoreError::too_short(BASIC_HEADER_SIZE, buf.len()));
        }
        let mut digest = [0u8; AUTH_DIGEST_SIZE];
        digest.copy_from_slice(&buf[..AUTH_DIGEST_SIZE]);
        Ok(AuthDigest::from_bytes(digest))
    }

    /// Reads the opcode from a raw datagram without consuming it.
    ///
    /// # Errors
    /// `MessageTooShort` or `UnknownOpcode`.
    pub fn peek_opcode(buf: &[u8]) -> Result<Opcode> {
        if buf.len() < BASIC_HEADER_SIZE {
            return Err(CoreError::too_short(BASIC_HEADER_SIZE, buf.len()));
        }
        Opcode::try_from(buf[AUTH_DIGEST_SIZE])
    }

    /// Returns the byte range of the (padded) `IPDATA` payload inside a
    /// raw datagram, or `None` for messages without a payload.
    ///
    /// The datagram is validated exactly as [`Codec::decode`] would, so a
    /// returned range is always in bounds.
    ///
    /// # Errors
    /// Any format or capacity error `decode` would report.
    pub fn payload_span(&self, buf: &[u8]) -> Result<Option<Range<usize>>> {
        match Self::peek_opcode(buf)? {
            Opcode::IpData => {
                let header = self.ipdata_header(buf)?;
                Ok(Some(IPDATA_HEADER_SIZE..IPDATA_HEADER_SIZE + header.span))
            }
            Opcode::Noop | Opcode::Disconnect => Ok(None),
        }
    }

    /// Validates the `IPDATA` header of a full datagram.
    fn ipdata_header(&self, raw: &[u8]) -> Result<IpDataHeader> {
        if raw.len() < IPDATA_HEADER_SIZE {
            return Err(CoreError::too_short(IPDATA_HEADER_SIZE, raw.len()));
        }

        let mut fields = &raw[BASIC_HEADER_SIZE..IPDATA_HEADER_SIZE];
        let proto = fields.get_u16();
        let length = usize::from(fields.get_u16());

        let protocol = IpProtocol::from_u16(proto).ok_or(CoreError::UnknownProtocol(proto))?;

        let remaining = raw.len() - IPDATA_HEADER_SIZE;
        if length > remaining {
            return Err(CoreError::malformed(format!(
                "declared length {length} exceeds remaining {remaining} bytes"
            )));
        }

        if length > self.max_payload {
            return Err(CoreError::too_large(self.max_payload, length));
        }

        let span = self.padded_len(length);
        if span > remaining {
            return Err(CoreError::malformed(format!(
                "padded payload of {span} bytes exceeds remaining {remaining} bytes"
            )));
        }

        if length < protocol.min_packet_len() {
            return Err(CoreError::malformed(format!(
                "{length} byte packet is shorter than the {:?} header",
                protocol
            )));
        }

        Ok(IpDataHeader {
            protocol,
            length,
            span,
        })
    }
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new(MAX_IPDATA_SIZE)
    }
}

// ============================================
// TunnelMessage Codec
// ============================================

impl Codec<TunnelMessage> for ProtocolCodec {
    fn encode(&self, msg: &TunnelMessage, buf: &mut BytesMut) -> Result<()> {
        if let Message::IpData(data) = &msg.message {
            let len = data.packet.len();
            if len > self.max_payload {
                return Err(CoreError::too_large(self.max_payload, len));
            }
            if len < data.protocol.min_packet_len() {
                return Err(CoreError::malformed(format!(
                    "{len} byte packet is shorter than the {:?} header",
                    data.protocol
                )));
            }
        }

        buf.reserve(self.encoded_len(&msg.message));
        buf.put_slice(msg.digest.as_bytes());
        buf.put_u8(msg.message.opcode().as_byte());

        if let Message::IpData(data) = &msg.message {
            let len = data.packet.len();
            let wire_len = u16::try_from(len).map_err(|_| CoreError::too_large(self.max_payload, len))?;
            buf.put_u16(data.protocol.as_u16());
            buf.put_u16(wire_len);
            buf.put_slice(&data.packet);
            buf.put_bytes(0, self.padded_len(len) - len);
        }

        Ok(())
    }

    fn decode(&self, buf: &mut Bytes) -> Result<TunnelMessage> {
        let digest = Self::peek_digest(buf)?;
        let opcode = Self::peek_opcode(buf)?;

        let message = match opcode {
            Opcode::Noop => Message::Noop,
            Opcode::Disconnect => Message::Disconnect,
            Opcode::IpData => {
                let header = self.ipdata_header(buf)?;
                buf.advance(IPDATA_HEADER_SIZE);
                let packet = buf.split_to(header.length);
                Message::IpData(IpData {
                    protocol: header.protocol,
                    packet,
                })
            }
        };

        // Trailing bytes (padding, or slack after a control message) are discarded.
        buf.advance(buf.remaining());

        Ok(TunnelMessage { digest, message })
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Encodes a message to a fresh buffer.
///
/// # Errors
/// See [`Codec::encode`].
pub fn encode_message(codec: &ProtocolCodec, msg: &TunnelMessage) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(codec.encoded_len(&msg.message));
    codec.encode(msg, &mut buf)?;
    Ok(buf)
}

/// Decodes a message from a byte slice.
///
/// # Errors
/// See [`Codec::decode`].
pub fn decode_message(codec: &ProtocolCodec, buf: &[u8]) -> Result<TunnelMessage> {
    let mut bytes = Bytes::copy_from_slice(buf);
    codec.decode(&mut bytes)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> AuthDigest {
        AuthDigest::from_bytes([0xAB; AUTH_DIGEST_SIZE])
    }

    fn ipv4_packet(len: usize) -> Bytes {
        let mut packet = vec![0u8; len];
        packet[0] = 0x45;
        Bytes::from(packet)
    }

    fn ipdata(packet: Bytes) -> TunnelMessage {
        TunnelMessage::new(digest(), Message::IpData(IpData::from_packet(packet).unwrap()))
    }

    /// Builds a raw IPDATA datagram with arbitrary header fields.
    fn raw_ipdata(proto: u16, declared: u16, body: usize) -> Vec<u8> {
        let mut raw = vec![0xAB; AUTH_DIGEST_SIZE];
        raw.push(Opcode::IpData.as_byte());
        raw.extend_from_slice(&proto.to_be_bytes());
        raw.extend_from_slice(&declared.to_be_bytes());
        let mut packet = vec![0u8; body];
        if let Some(first) = packet.first_mut() {
            *first = 0x45;
        }
        raw.extend_from_slice(&packet);
        raw
    }

    #[test]
    fn test_control_message_layout() {
        let codec = ProtocolCodec::default();
        let msg = TunnelMessage::new(digest(), Message::Disconnect);

        let encoded = encode_message(&codec, &msg).unwrap();
        assert_eq!(encoded.len(), BASIC_HEADER_SIZE);
        assert_eq!(&encoded[..AUTH_DIGEST_SIZE], &[0xAB; AUTH_DIGEST_SIZE]);
        assert_eq!(encoded[AUTH_DIGEST_SIZE], 0x02);

        assert_eq!(decode_message(&codec, &encoded).unwrap(), msg);
    }

    #[test]
    fn test_ipdata_header_is_big_endian() {
        let codec = ProtocolCodec::default();
        let encoded = encode_message(&codec, &ipdata(ipv4_packet(40))).unwrap();

        assert_eq!(encoded.len(), IPDATA_HEADER_SIZE + 40);
        assert_eq!(&encoded[17..19], &[0x08, 0x00]);
        assert_eq!(&encoded[19..21], &[0x00, 40]);
        assert_eq!(encoded[21], 0x45);
    }

    #[test]
    fn test_ipdata_roundtrip() {
        let codec = ProtocolCodec::new(1408);
        let msg = ipdata(ipv4_packet(60));

        let encoded = encode_message(&codec, &msg).unwrap();
        assert_eq!(decode_message(&codec, &encoded).unwrap(), msg);
    }

    #[test]
    fn test_padding_is_stripped_by_declared_length() {
        let codec = ProtocolCodec::new(1408).with_block_alignment(16);
        let msg = ipdata(ipv4_packet(41));

        let encoded = encode_message(&codec, &msg).unwrap();
        assert_eq!(encoded.len(), IPDATA_HEADER_SIZE + 48);
        assert_eq!(&encoded[19..21], &[0x00, 41]);
        assert_eq!(codec.payload_span(&encoded).unwrap(), Some(21..69));

        let decoded = decode_message(&codec, &encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_too_short() {
        let codec = ProtocolCodec::default();
        let result = decode_message(&codec, &[0u8; 5]);
        assert_eq!(result, Err(CoreError::too_short(BASIC_HEADER_SIZE, 5)));

        let mut raw = raw_ipdata(0x0800, 20, 20);
        raw.truncate(19);
        assert!(matches!(
            decode_message(&codec, &raw),
            Err(CoreError::MessageTooShort { expected: 21, .. })
        ));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let codec = ProtocolCodec::default();
        let mut raw = vec![0u8; BASIC_HEADER_SIZE];
        raw[AUTH_DIGEST_SIZE] = 0x09;
        assert_eq!(decode_message(&codec, &raw), Err(CoreError::UnknownOpcode(0x09)));
    }

    #[test]
    fn test_declared_length_beyond_buffer_is_format_error() {
        let codec = ProtocolCodec::default();
        let raw = raw_ipdata(0x0800, 100, 40);

        let err = decode_message(&codec, &raw).unwrap_err();
        assert!(err.is_format_error());
        assert!(codec.payload_span(&raw).is_err());
    }

    #[test]
    fn test_oversized_length_is_format_error_when_buffer_is_short() {
        let codec = ProtocolCodec::new(1408);
        let raw = raw_ipdata(0x0800, 9000, 40);
        assert!(decode_message(&codec, &raw).unwrap_err().is_format_error());
    }

    #[test]
    fn test_declared_length_beyond_capacity() {
        let codec = ProtocolCodec::new(576);
        let raw = raw_ipdata(0x0800, 600, 600);

        let err = decode_message(&codec, &raw).unwrap_err();
        assert_eq!(err, CoreError::too_large(576, 600));
        assert!(err.is_capacity_error());
    }

    #[test]
    fn test_encode_rejects_oversized_packet() {
        let codec = ProtocolCodec::new(576);
        let err = encode_message(&codec, &ipdata(ipv4_packet(577))).unwrap_err();
        assert!(err.is_capacity_error());
    }

    #[test]
    fn test_unknown_protocol_and_short_packet() {
        let codec = ProtocolCodec::default();

        let raw = raw_ipdata(0x0806, 28, 28);
        assert_eq!(decode_message(&codec, &raw), Err(CoreError::UnknownProtocol(0x0806)));

        let raw = raw_ipdata(0x0800, 12, 12);
        assert!(decode_message(&codec, &raw).unwrap_err().is_format_error());

        let raw = raw_ipdata(0x86DD, 30, 30);
        assert!(decode_message(&codec, &raw).unwrap_err().is_format_error());
    }

    #[test]
    fn test_padded_span_must_fit() {
        let codec = ProtocolCodec::default().with_block_alignment(16);
        // 20 declared, 20 present, but 32 required once padded
        let raw = raw_ipdata(0x0800, 20, 20);
        assert!(decode_message(&codec, &raw).unwrap_err().is_format_error());
    }

    #[test]
    fn test_peek_helpers() {
        let raw = raw_ipdata(0x0800, 20, 20);
        assert_eq!(ProtocolCodec::peek_digest(&raw).unwrap(), digest());
        assert_eq!(ProtocolCodec::peek_opcode(&raw).unwrap(), Opcode::IpData);
        assert!(ProtocolCodec::peek_digest(&raw[..10]).is_err());

        let noop = encode_message(
            &ProtocolCodec::default(),
            &TunnelMessage::new(digest(), Message::Noop),
        )
        .unwrap();
        assert_eq!(ProtocolCodec::default().payload_span(&noop).unwrap(), None);
    }
}
