// ============================================
// File: crates/minivtun/src/server.rs
// ============================================
//! # Tunnel Server
//!
//! ## Creation Reason
//! The server end is passive: it learns where the client is from the
//! client's own datagrams and sends tunnel traffic back there.
//!
//! ## Main Functionality
//! - `TunnelServer::run`: relay loop driven by the `PeerTable`
//! - `NOOP` is echoed so an idle client still sees traffic
//! - Silent peers are swept once per keepalive interval
//!
//! ## Server Architecture
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                TunnelServer                  │
//! │                                              │
//! │  UDP ──► open ──► observe ──► IPDATA ──► TUN │
//! │                      │                       │
//! │                  PeerTable                   │
//! │                      │                       │
//! │  TUN ──► seal ──► most_recent ─────────► UDP │
//! │                                              │
//! │  tick ──► sweep (every keepalive interval)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No peer means the outbound packet is dropped; nothing is queued
//! - The server never sends `DISCONNECT`
//!
//! ## Last Modified
//! v0.1.0 - Initial server runner

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use minivtun_core::Message;
use minivtun_transport::{PacketSource, Transport, TunDevice};

use crate::config::LinkTimers;
use crate::error::Result;
use crate::handlers::{log_dropped, PacketHandler};
use crate::relay::{RelayEvent, RelayIo};
use crate::services::{PeerId, PeerTable};

// ============================================
// TunnelServer
// ============================================

/// Server end of the tunnel.
pub struct TunnelServer<T: Transport, D: TunDevice> {
    handler: PacketHandler,
    peers: PeerTable,
    timers: LinkTimers,
    last_sweep: Instant,
    io: RelayIo<T, D>,
}

impl<T: Transport, D: TunDevice> TunnelServer<T, D> {
    /// Creates a server.
    #[must_use]
    pub fn new(handler: PacketHandler, timers: LinkTimers, io: RelayIo<T, D>) -> Self {
        Self {
            handler,
            peers: PeerTable::new(),
            timers,
            last_sweep: Instant::now(),
            io,
        }
    }

    /// Runs until shutdown or a fatal device error.
    ///
    /// # Errors
    /// TUN read or write failure.
    pub async fn run(&mut self) -> Result<()> {
        if let Ok(addr) = self.io.udp().local_addr() {
            info!(listen = %addr, "Waiting for peer");
        }

        loop {
            match self.io.next_event().await? {
                RelayEvent::Shutdown => {
                    debug!("Server received shutdown signal");
                    break;
                }
                RelayEvent::Tick(now) => self.on_tick(now),
                RelayEvent::Tun(packet) => self.on_tun_packet(&packet).await,
                RelayEvent::Datagram(datagram, source) => {
                    self.on_datagram(datagram, source).await?;
                }
            }
        }

        info!(peers = self.peers.len(), "Server stopped");
        Ok(())
    }

    fn on_tick(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) >= self.timers.keepalive {
            self.peers.sweep(now, self.timers.reconnect_timeout);
            self.last_sweep = now;
        }
    }

    async fn on_tun_packet(&self, packet: &[u8]) {
        let Some(dest) = self
            .peers
            .most_recent(Instant::now(), self.timers.reconnect_timeout)
        else {
            trace!(len = packet.len(), "No peer, dropping outbound packet");
            return;
        };

        match self.handler.seal_ip_packet(packet) {
            Ok(datagram) => {
                self.io.send(&datagram, dest).await;
            }
            Err(e) => debug!(len = packet.len(), "Dropping outbound packet: {}", e),
        }
    }

    async fn on_datagram(&mut self, datagram: BytesMut, source: PacketSource) -> Result<()> {
        let message = match self.handler.open(datagram) {
            Ok(message) => message,
            Err(e) => {
                log_dropped(&e, source.addr);
                return Ok(());
            }
        };

        let id = PeerId::from_digest(self.handler.digest());

        match message {
            Message::IpData(data) => {
                self.peers.observe(id, source.addr, source.timestamp);
                self.io.write_tun(&data.packet).await?;
            }
            Message::Noop => {
                self.peers.observe(id, source.addr, source.timestamp);
                match self.handler.seal(&Message::Noop) {
                    Ok(reply) => {
                        self.io.send(&reply, source.addr).await;
                    }
                    Err(e) => debug!("Failed to encode keepalive reply: {}", e),
                }
            }
            Message::Disconnect => {
                self.peers.remove(&id);
            }
        }

        Ok(())
    }

    /// Returns the peer table.
    #[must_use]
    pub const fn peers(&self) -> &PeerTable {
        &self.peers
    }
}

impl<T: Transport, D: TunDevice> std::fmt::Debug for TunnelServer<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelServer")
            .field("peers", &self.peers.len())
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
