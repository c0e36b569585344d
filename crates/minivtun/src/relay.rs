// ============================================
// File: crates/minivtun/src/relay.rs
// ============================================
//! # Relay I/O
//!
//! ## Creation Reason
//! Client and server share the same readiness wait: shutdown signal,
//! timer tick, UDP socket and TUN device. This module owns the buffers
//! and turns that wait into one event at a time.
//!
//! ## Main Functionality
//! - `RelayIo::next_event`: the single `tokio::select!` of the process
//! - `RelayIo::send`: best-effort datagram send
//! - `RelayIo::write_tun`: packet delivery to the interface
//!
//! ## Event Loop
//! ```text
//! loop {
//!     select! (biased) {
//!         shutdown  ──► Shutdown
//!         tick      ──► Tick(now)
//!         udp.recv  ──► Datagram(bytes, source)   (recv errors: warn, retry)
//!         tun.read  ──► Tun(packet)               (errors: fatal)
//!     }
//! }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every branch must stay cancellation safe: a losing branch is
//!   dropped mid-wait and polled again on the next call
//! - Nothing is spawned; the runner processes each event to completion
//!   before asking for the next one
//!
//! ## Last Modified
//! v0.1.0 - Initial relay loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{trace, warn};

use minivtun_transport::{PacketSource, Transport, TunDevice};

use crate::error::{Result, TunnelError};
use crate::handlers::MAX_DATAGRAM_SIZE;

// ============================================
// RelayEvent
// ============================================

/// One unit of work for a runner.
#[derive(Debug)]
pub enum RelayEvent {
    /// Local shutdown was requested.
    Shutdown,
    /// The periodic timer fired.
    Tick(Instant),
    /// An IP packet was read from the interface.
    Tun(Bytes),
    /// A datagram arrived on the socket.
    Datagram(BytesMut, PacketSource),
}

// ============================================
// RelayIo
// ============================================

/// Readiness multiplexer over one socket and one interface.
pub struct RelayIo<T: Transport, D: TunDevice> {
    udp: Arc<T>,
    tun: Arc<D>,
    shutdown: broadcast::Receiver<()>,
    tick: Interval,
    udp_buf: Vec<u8>,
    tun_buf: Vec<u8>,
}

impl<T: Transport, D: TunDevice> RelayIo<T, D> {
    /// Creates the multiplexer; the first tick fires one period from now.
    #[must_use]
    pub fn new(
        udp: Arc<T>,
        tun: Arc<D>,
        shutdown: broadcast::Receiver<()>,
        tick_period: Duration,
    ) -> Self {
        let mut tick = tokio::time::interval_at(Instant::now() + tick_period, tick_period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            udp,
            tun,
            shutdown,
            tick,
            udp_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            tun_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    /// Waits for the next event.
    ///
    /// # Errors
    /// A TUN read failure, or a socket error other than a failed
    /// receive (for example a socket that was shut down).
    pub async fn next_event(&mut self) -> Result<RelayEvent> {
        let Self {
            udp,
            tun,
            shutdown,
            tick,
            udp_buf,
            tun_buf,
        } = self;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => return Ok(RelayEvent::Shutdown),

                now = tick.tick() => return Ok(RelayEvent::Tick(now)),

                result = udp.recv(&mut udp_buf[..]) => match result {
                    Ok((len, source)) => {
                        trace!(len, from = %source.addr, "Datagram received");
                        return Ok(RelayEvent::Datagram(BytesMut::from(&udp_buf[..len]), source));
                    }
                    Err(e) => {
                        let e = TunnelError::from(e);
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!("UDP receive error: {}", e);
                    }
                },

                result = tun.read(&mut tun_buf[..]) => {
                    let len = result?;
                    return Ok(RelayEvent::Tun(Bytes::copy_from_slice(&tun_buf[..len])));
                }
            }
        }
    }

    /// Sends a datagram; failures are logged and swallowed.
    ///
    /// Returns `true` if the socket accepted the datagram.
    pub async fn send(&self, datagram: &[u8], dest: SocketAddr) -> bool {
        match self.udp.send(datagram, &dest).await {
            Ok(_) => true,
            Err(e) => {
                warn!(dest = %dest, "UDP send error: {}", e);
                false
            }
        }
    }

    /// Writes one packet to the interface.
    ///
    /// # Errors
    /// The device write failure.
    pub async fn write_tun(&self, packet: &[u8]) -> Result<()> {
        self.tun.write(packet).await?;
        Ok(())
    }

    /// Returns the socket.
    #[must_use]
    pub fn udp(&self) -> &Arc<T> {
        &self.udp
    }

    /// Returns the interface.
    #[must_use]
    pub fn tun(&self) -> &Arc<D> {
        &self.tun
    }
}

impl<T: Transport, D: TunDevice> std::fmt::Debug for RelayIo<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayIo")
            .field("local_addr", &self.udp.local_addr().ok())
            .field("tun", &self.tun.name())
            .field("period", &self.tick.period())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use minivtun_transport::tun::MockTun;
    use minivtun_transport::UdpTransport;

    async fn relay(
        period: Duration,
    ) -> (
        RelayIo<UdpTransport, MockTun>,
        Arc<UdpTransport>,
        Arc<MockTun>,
        broadcast::Sender<()>,
    ) {
        let udp = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
        let tun = Arc::new(MockTun::default());
        let (tx, rx) = broadcast::channel(1);
        let io = RelayIo::new(Arc::clone(&udp), Arc::clone(&tun), rx, period);
        (io, udp, tun, tx)
    }

    #[tokio::test]
    async fn test_tun_packet_event() {
        let (mut io, _udp, tun, _tx) = relay(Duration::from_secs(60)).await;
        tun.inject(vec![0x45; 20]);

        match io.next_event().await.unwrap() {
            RelayEvent::Tun(packet) => assert_eq!(packet.len(), 20),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_datagram_event() {
        let (mut io, udp, _tun, _tx) = relay(Duration::from_secs(60)).await;
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let dest = udp.local_addr().unwrap();

        sender.send(b"hello", &dest).await.unwrap();

        match io.next_event().await.unwrap() {
            RelayEvent::Datagram(bytes, source) => {
                assert_eq!(&bytes[..], b"hello");
                assert_eq!(source.addr, sender.local_addr().unwrap());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tick_event() {
        let (mut io, _udp, _tun, _tx) = relay(Duration::from_millis(20)).await;
        assert!(matches!(io.next_event().await.unwrap(), RelayEvent::Tick(_)));
    }

    #[tokio::test]
    async fn test_shutdown_wins() {
        let (mut io, _udp, tun, tx) = relay(Duration::from_secs(60)).await;
        tun.inject(vec![0x45; 20]);
        tx.send(()).unwrap();

        assert!(matches!(io.next_event().await.unwrap(), RelayEvent::Shutdown));
    }

    #[tokio::test]
    async fn test_tun_failure_is_fatal() {
        let (mut io, _udp, tun, _tx) = relay(Duration::from_secs(60)).await;
        tun.fail_reads();

        let err = io.next_event().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_closed_socket_ends_loop() {
        let (mut io, udp, _tun, _tx) = relay(Duration::from_secs(60)).await;
        udp.shutdown().await.unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), io.next_event())
            .await
            .expect("closed socket must not spin")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_write_tun() {
        let (io, _udp, tun, _tx) = relay(Duration::from_secs(60)).await;
        io.write_tun(&[0x60; 40]).await.unwrap();
        assert_eq!(tun.take_written(), vec![vec![0x60; 40]]);
    }
}
