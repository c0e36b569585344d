// ============================================
// File: crates/minivtun/src/handlers/packet.rs
// ============================================
//! # Packet Handler
//!
//! ## Creation Reason
//! Turns IP packets into sealed datagrams and datagrams back into
//! authenticated messages, combining the codec with the payload cipher.
//!
//! ## Main Functionality
//! - `PacketHandler::seal_ip_packet`: TUN packet → `IPDATA` datagram
//! - `PacketHandler::seal`: any message → datagram
//! - `PacketHandler::open`: datagram → authenticated `Message`
//!
//! ## Packet Processing
//!
//! ### TUN → UDP
//! ```text
//! 1. Tag protocol from the version nibble (4 → 0x0800, 6 → 0x86DD)
//! 2. Encode: digest | opcode | proto | len | packet | zero padding
//! 3. Encrypt bytes [21..] in place (if encryption is on)
//! ```
//!
//! ### UDP → TUN
//! ```text
//! 1. Compare the header digest with ours (constant time)
//! 2. Validate the IPDATA header and locate the padded payload
//! 3. Decrypt the payload in place (if encryption is on)
//! 4. Decode; `len` strips the padding
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The digest is checked before anything else is looked at, so an
//!   unauthenticated datagram is dropped whatever its opcode
//! - Errors are returned, never answered on the wire
//!
//! ## Last Modified
//! v0.1.0 - Initial packet handler

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use minivtun_core::crypto::{
    decrypt_in_place, derive_auth_digest, derive_schedules, encrypt_in_place, AES_BLOCK_SIZE,
};
use minivtun_core::protocol::{Codec, IPDATA_HEADER_SIZE, MAX_IPDATA_SIZE};
use minivtun_core::{
    AuthDigest, CoreError, DecryptKey, EncryptKey, IpData, Message, ProtocolCodec, Result,
    TunnelMessage,
};

// ============================================
// Constants
// ============================================

/// Receive buffer size that fits the largest valid datagram.
pub const MAX_DATAGRAM_SIZE: usize = IPDATA_HEADER_SIZE + MAX_IPDATA_SIZE + AES_BLOCK_SIZE;

// ============================================
// PacketHandler
// ============================================

/// Seals and opens tunnel datagrams for one passphrase.
pub struct PacketHandler {
    codec: ProtocolCodec,
    digest: AuthDigest,
    cipher: Option<(EncryptKey, DecryptKey)>,
}

impl PacketHandler {
    /// Creates a handler.
    ///
    /// Encryption is active only when `encryption` is set and the
    /// passphrase is non-empty. The digest is always derived.
    ///
    /// # Errors
    /// `KeyDerivation` if HKDF fails.
    pub fn new(passphrase: &str, encryption: bool, max_payload: usize) -> Result<Self> {
        let digest = derive_auth_digest(passphrase.as_bytes())?;

        let cipher = if encryption && !passphrase.is_empty() {
            Some(derive_schedules(passphrase.as_bytes())?)
        } else {
            None
        };

        let mut codec = ProtocolCodec::new(max_payload);
        if cipher.is_some() {
            codec = codec.with_block_alignment(AES_BLOCK_SIZE);
        }

        debug!(
            digest = %digest.fingerprint(),
            encryption = cipher.is_some(),
            max_payload = codec.max_payload(),
            "Packet handler ready"
        );

        Ok(Self {
            codec,
            digest,
            cipher,
        })
    }

    /// Returns the local passphrase digest.
    #[must_use]
    pub const fn digest(&self) -> &AuthDigest {
        &self.digest
    }

    /// Returns `true` if payloads are encrypted.
    #[must_use]
    pub const fn encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Returns the codec in use.
    #[must_use]
    pub const fn codec(&self) -> &ProtocolCodec {
        &self.codec
    }

    /// Wraps one IP packet read from the TUN device.
    ///
    /// # Errors
    /// - `MalformedMessage`: not an IPv4/IPv6 packet, or too short
    /// - `PayloadTooLarge`: packet exceeds the configured MTU
    pub fn seal_ip_packet(&self, packet: &[u8]) -> Result<Bytes> {
        let data = IpData::from_packet(Bytes::copy_from_slice(packet))?;
        self.seal(&Message::IpData(data))
    }

    /// Encodes and, for `IPDATA`, encrypts a message.
    ///
    /// # Errors
    /// Any codec or cipher error.
    pub fn seal(&self, message: &Message) -> Result<Bytes> {
        let msg = TunnelMessage::new(self.digest, message.clone());
        let mut buf = BytesMut::with_capacity(self.codec.encoded_len(message));
        self.codec.encode(&msg, &mut buf)?;

        if let (Message::IpData(_), Some((enc, _))) = (message, &self.cipher) {
            encrypt_in_place(enc, &mut buf[IPDATA_HEADER_SIZE..])?;
        }

        Ok(buf.freeze())
    }

    /// Authenticates, decrypts and decodes one received datagram.
    ///
    /// # Errors
    /// - `AuthenticationFailed`: digest mismatch
    /// - any format or capacity error from the codec
    pub fn open(&self, mut datagram: BytesMut) -> Result<Message> {
        let received = ProtocolCodec::peek_digest(&datagram)?;
        if !self.digest.verify(&received) {
            return Err(CoreError::AuthenticationFailed);
        }

        let span = self.codec.payload_span(&datagram)?;
        if let (Some(span), Some((_, dec))) = (span, &self.cipher) {
            decrypt_in_place(dec, &mut datagram[span])?;
        }

        let mut bytes = datagram.freeze();
        Ok(self.codec.decode(&mut bytes)?.message)
    }
}

/// Short label for why a datagram was dropped, used as a log field.
#[must_use]
pub const fn drop_reason(error: &CoreError) -> &'static str {
    if error.is_suspicious() {
        "unauthenticated"
    } else if error.is_format_error() {
        "malformed"
    } else if error.is_capacity_error() {
        "oversized"
    } else if error.is_crypto_error() {
        "undecryptable"
    } else {
        "other"
    }
}

/// Logs a dropped datagram without flooding on hostile traffic.
///
/// Unauthenticated datagrams go to `trace`; anything that passed the
/// digest check but still failed goes to `debug`.
pub fn log_dropped(error: &CoreError, from: SocketAddr) {
    let reason = drop_reason(error);
    if error.is_suspicious() {
        trace!(from = %from, reason, "Dropping datagram");
    } else {
        debug!(from = %from, reason, "Dropping datagram: {}", error);
    }
}

impl std::fmt::Debug for PacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandler")
            .field("digest", &self.digest)
            .field("encryption", &self.encryption_enabled())
            .field("max_payload", &self.codec.max_payload())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
