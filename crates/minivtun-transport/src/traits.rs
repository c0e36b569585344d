// ============================================
// File: crates/minivtun-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the two I/O seams of the tunnel so the relay loop can run
//! against real sockets and devices in production and in-memory
//! doubles in tests.
//!
//! ## Main Functionality
//! - `Transport`: datagram transport interface
//! - `TunDevice`: virtual interface read/write interface
//! - `PacketSource`: where and when a datagram arrived
//! - `TunConfig`: device name, MTU and tunnel addressing
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync for use in async contexts
//! - Buffer management is caller's responsibility
//! - TUN data is raw IP, no packet-information prefix
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{Result, TransportError};

// ============================================
// PacketSource
// ============================================

/// Metadata about the source of a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketSource {
    /// Source address (IP and port).
    pub addr: SocketAddr,
    /// When the datagram was received.
    pub timestamp: Instant,
}

impl PacketSource {
    /// Creates a new `PacketSource` stamped with the current time.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timestamp: Instant::now(),
        }
    }

    /// Creates a `PacketSource` with a specific timestamp.
    #[must_use]
    pub const fn with_timestamp(addr: SocketAddr, timestamp: Instant) -> Self {
        Self { addr, timestamp }
    }
}

// ============================================
// Transport Trait
// ============================================

/// Abstract interface for datagram-based transport.
///
/// # Example
/// ```ignore
/// async fn echo<T: Transport>(transport: &T) -> Result<()> {
///     let mut buf = [0u8; 1500];
///     let (len, source) = transport.recv(&mut buf).await?;
///     transport.send(&buf[..len], &source.addr).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receives one datagram.
    ///
    /// # Returns
    /// Tuple of (bytes received, packet source)
    ///
    /// # Errors
    /// Returns error if receive fails
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, PacketSource)>;

    /// Sends one datagram.
    ///
    /// # Errors
    /// Returns error if send fails
    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize>;

    /// Returns the local address this transport is bound to.
    ///
    /// # Errors
    /// Returns error if address cannot be determined
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Gracefully shuts down the transport.
    ///
    /// After shutdown, all operations will return errors.
    ///
    /// # Errors
    /// Returns error if shutdown fails
    async fn shutdown(&self) -> Result<()>;

    /// Returns `true` if the transport is still active.
    fn is_active(&self) -> bool;
}

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface for the virtual network interface.
///
/// # Data Format
/// One call reads or writes exactly one raw IPv4 or IPv6 packet.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP packet.
    ///
    /// # Errors
    /// Returns error if read fails
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one IP packet.
    ///
    /// # Errors
    /// Returns error if write fails
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns the device name.
    fn name(&self) -> &str;

    /// Returns the MTU (Maximum Transmission Unit).
    fn mtu(&self) -> u16;

    /// Assigns the configured addresses and MTU and activates the device.
    ///
    /// # Errors
    /// Returns error if activation fails
    async fn up(&self) -> Result<()>;

    /// Deactivates the device.
    ///
    /// # Errors
    /// Returns error if deactivation fails
    async fn down(&self) -> Result<()>;

    /// Returns `true` if the device is up and active.
    fn is_up(&self) -> bool;
}

// ============================================
// Tunnel Addressing
// ============================================

/// IPv4 point-to-point pair, written `local/peer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointToPoint {
    /// Address of this end of the tunnel.
    pub local: Ipv4Addr,
    /// Address of the far end of the tunnel.
    pub peer: Ipv4Addr,
}

impl FromStr for PointToPoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::invalid("ipv4 pair", s, "expected local/peer");
        let (local, peer) = s.split_once('/').ok_or_else(invalid)?;
        Ok(Self {
            local: local.trim().parse().map_err(|_| invalid())?,
            peer: peer.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for PointToPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.local, self.peer)
    }
}

/// IPv6 interface address, written `addr/prefix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Cidr {
    /// Interface address.
    pub addr: Ipv6Addr,
    /// Prefix length.
    pub prefix: u8,
}

impl FromStr for Ipv6Cidr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::invalid("ipv6 address", s, "expected addr/prefix");
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;
        if prefix > 128 {
            return Err(invalid());
        }
        Ok(Self {
            addr: addr.trim().parse().map_err(|_| invalid())?,
            prefix,
        })
    }
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

// ============================================
// TunConfig
// ============================================

/// Smallest MTU accepted for the tunnel interface.
pub const MIN_TUN_MTU: u16 = 576;

/// Largest MTU accepted (one packet must fit one message payload).
pub const MAX_TUN_MTU: u16 = 8192;

/// Configuration for TUN device creation.
///
/// # Example
/// ```
/// use minivtun_transport::traits::TunConfig;
///
/// let config = TunConfig::new("p2p%d")
///     .with_ipv4("10.7.0.1/10.7.0.2".parse().unwrap())
///     .with_mtu(1408);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunConfig {
    /// Device name or kernel pattern (e.g., "p2p%d").
    pub name: String,
    /// MTU size.
    pub mtu: u16,
    /// IPv4 point-to-point pair.
    pub ipv4: Option<PointToPoint>,
    /// IPv6 interface address.
    pub ipv6: Option<Ipv6Cidr>,
}

impl TunConfig {
    /// Creates a new TUN configuration with no addresses.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: 1408,
            ipv4: None,
            ipv6: None,
        }
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the IPv4 point-to-point pair.
    #[must_use]
    pub const fn with_ipv4(mut self, pair: PointToPoint) -> Self {
        self.ipv4 = Some(pair);
        self
    }

    /// Sets the IPv6 address.
    #[must_use]
    pub const fn with_ipv6(mut self, cidr: Ipv6Cidr) -> Self {
        self.ipv6 = Some(cidr);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TransportError::invalid(
                "device name",
                &self.name,
                "cannot be empty",
            ));
        }

        if self.name.len() > 15 {
            return Err(TransportError::invalid(
                "device name",
                &self.name,
                "cannot exceed 15 characters",
            ));
        }

        if !(MIN_TUN_MTU..=MAX_TUN_MTU).contains(&self.mtu) {
            return Err(TransportError::invalid(
                "mtu",
                self.mtu.to_string(),
                format!("must be between {MIN_TUN_MTU} and {MAX_TUN_MTU}"),
            ));
        }

        if let Some(pair) = self.ipv4 {
            if pair.local == pair.peer {
                return Err(TransportError::invalid(
                    "ipv4 pair",
                    pair.to_string(),
                    "local and peer tunnel addresses must differ",
                ));
            }
        }

        Ok(())
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self::new("p2p%d")
    }
}

// ============================================
// Tests
// ============================================
