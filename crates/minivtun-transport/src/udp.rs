// ============================================
// File: crates/minivtun-transport/src/udp.rs
// ============================================
//! # UDP Transport Implementation
//!
//! ## Creation Reason
//! Carries tunnel messages between the two endpoints, wrapping Tokio's
//! UDP socket with our `Transport` trait.
//!
//! ## Main Functionality
//! - `UdpTransport`: bound datagram socket
//! - `UdpTransport::bind_for_peer`: ephemeral bind matching a peer's family
//! - `resolve`: `host:port` name resolution
//!
//! ## Design Choices
//! - `SO_REUSEADDR` so a restarted server can rebind at once
//! - IPv6 sockets are v6-only, an IPv4 peer needs an IPv4 socket
//!
//! ## ⚠️ Important Note for Next Developer
//! - UDP is connectionless: a lost keepalive is simply retried on the
//!   next interval
//! - A client binds a fresh ephemeral port on every start, the server
//!   learns it from the first authenticated datagram
//!
//! ## Last Modified
//! v0.1.0 - Initial UDP transport implementation

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{PacketSource, Transport};

// ============================================
// Name Resolution
// ============================================

/// Resolves a `host:port` string to a single socket address.
///
/// Literal addresses are returned without touching the resolver. For
/// names with several records the first one wins.
///
/// # Errors
/// `Resolve` if the lookup fails or yields nothing.
pub async fn resolve(host: &str) -> Result<SocketAddr> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let mut addrs = tokio::net::lookup_host(host)
        .await
        .map_err(|e| TransportError::resolve(host, e.to_string()))?;

    let addr = addrs
        .next()
        .ok_or_else(|| TransportError::resolve(host, "no addresses returned"))?;

    debug!("Resolved {} to {}", host, addr);
    Ok(addr)
}

// ============================================
// UdpTransport
// ============================================

/// UDP-based transport implementation.
///
/// # Example
/// ```ignore
/// use minivtun_transport::UdpTransport;
///
/// let transport = UdpTransport::bind("0.0.0.0:1414").await?;
///
/// let mut buf = [0u8; 1500];
/// let (len, source) = transport.recv(&mut buf).await?;
/// transport.send(&buf[..len], &source.addr).await?;
/// ```
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    shutdown: AtomicBool,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address.
    ///
    /// # Errors
    /// - `Invalid`: if `addr` is not a socket address
    /// - `Bind`: if binding fails
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self> {
        let addr_str = addr.as_ref();
        let socket_addr: SocketAddr = addr_str.parse().map_err(|_| {
            TransportError::invalid("socket address", addr_str, "expected ip:port")
        })?;

        Self::bind_addr(socket_addr).await
    }

    /// Binds an ephemeral port on the unspecified address of the same
    /// family as `peer`.
    ///
    /// # Errors
    /// Returns error if binding fails.
    pub async fn bind_for_peer(peer: SocketAddr) -> Result<Self> {
        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        Self::bind_addr(local).await
    }

    /// Creates a new UDP transport bound to the specified socket address.
    ///
    /// # Errors
    /// Returns error if binding fails.
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self> {
        debug!("Binding UDP transport to {}", addr);

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::io("creating UDP socket"))?;

        socket
            .set_reuse_address(true)
            .map_err(TransportError::io("setting SO_REUSEADDR"))?;

        if addr.is_ipv6() {
            socket
                .set_only_v6(true)
                .map_err(TransportError::io("setting IPV6_V6ONLY"))?;
        }

        socket
            .set_nonblocking(true)
            .map_err(TransportError::io("setting non-blocking"))?;

        socket
            .bind(&addr.into())
            .map_err(|source| TransportError::Bind { addr, source })?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(TransportError::io("converting to Tokio socket"))?;

        let local_addr = socket
            .local_addr()
            .map_err(TransportError::io("getting local address"))?;

        info!("UDP transport bound to {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Checks if the transport has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, PacketSource)> {
        if self.is_shutdown() {
            return Err(TransportError::Closed);
        }

        let (len, addr) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(TransportError::Recv)?;

        trace!("Received {} bytes from {}", len, addr);

        Ok((len, PacketSource::new(addr)))
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        if self.is_shutdown() {
            return Err(TransportError::Closed);
        }

        let len = self
            .socket
            .send_to(buf, dest)
            .await
            .map_err(|source| TransportError::Send {
                dest: *dest,
                source,
            })?;

        trace!("Sent {} bytes to {}", len, dest);

        Ok(len)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        debug!("UDP transport on {} shut down", self.local_addr);
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.is_shutdown()
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.local_addr)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_local_addr() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        assert_eq!(addr.ip(), Ipv4Addr::LOCALHOST);
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_bind_for_peer_matches_family() {
        let peer: SocketAddr = "127.0.0.1:1414".parse().unwrap();
        let transport = UdpTransport::bind_for_peer(peer).await.unwrap();

        assert!(transport.local_addr().unwrap().is_ipv4());
    }

    #[tokio::test]
    async fn test_send_recv_loopback() {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        let server_addr = server.local_addr().unwrap();
        let client_addr = client.local_addr().unwrap();

        client.send(b"keepalive", &server_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, source) = server.recv(&mut buf).await.unwrap();

        assert_eq!(&buf[..len], b"keepalive");
        assert_eq!(source.addr, client_addr);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert!(transport.is_active());

        transport.shutdown().await.unwrap();
        assert!(!transport.is_active());

        let mut buf = [0u8; 16];
        let result = transport.recv(&mut buf).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let result = UdpTransport::bind("not-an-address").await;
        assert!(matches!(result, Err(TransportError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve("127.0.0.1:1414").await.unwrap();
        assert_eq!(addr, "127.0.0.1:1414".parse::<SocketAddr>().unwrap());

        let addr = resolve("[::1]:1414").await.unwrap();
        assert!(addr.is_ipv6());
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_port() {
        let result = resolve("127.0.0.1").await;
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }
}
