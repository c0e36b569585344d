// ============================================
// File: crates/minivtun/src/client.rs
// ============================================
//! # Tunnel Client
//!
//! ## Creation Reason
//! The client end keeps the link alive on its own: it sends keepalives,
//! follows the server if its address changes, and falls back to the
//! configured address when the server goes quiet.
//!
//! ## Main Functionality
//! - `TunnelClient::run`: relay loop driven by `ClientSession`
//! - Host-name peers are re-resolved on every link reset
//! - Two best-effort `DISCONNECT`s on shutdown
//!
//! ## ⚠️ Important Note for Next Developer
//! - Outbound traffic always goes to `session.active_peer()`; never
//!   cache the address across events
//! - A failed or slow resolution keeps the previous address; lookups
//!   run inside the relay loop, so they are cut off after
//!   `RESOLVE_TIMEOUT`
//!
//! ## Last Modified
//! v0.1.0 - Initial client runner

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use minivtun_core::Message;
use minivtun_transport::{resolve, PacketSource, Transport, TunDevice};

use crate::config::LinkTimers;
use crate::error::Result;
use crate::handlers::{log_dropped, PacketHandler};
use crate::relay::{RelayEvent, RelayIo};
use crate::services::{ClientSession, LinkState};

/// Number of `DISCONNECT` datagrams sent on shutdown.
const DISCONNECT_REPEAT: usize = 2;

/// Upper bound on the shutdown notification.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on a peer re-resolution; the relay loop waits for it.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================
// TunnelClient
// ============================================

/// Client end of the tunnel.
pub struct TunnelClient<T: Transport, D: TunDevice> {
    handler: PacketHandler,
    session: ClientSession,
    peer_host: Option<String>,
    io: RelayIo<T, D>,
}

impl<T: Transport, D: TunDevice> TunnelClient<T, D> {
    /// Creates a client toward an already resolved `peer`.
    #[must_use]
    pub fn new(handler: PacketHandler, peer: SocketAddr, timers: LinkTimers, io: RelayIo<T, D>) -> Self {
        Self {
            handler,
            session: ClientSession::new(peer, timers, Instant::now()),
            peer_host: None,
            io,
        }
    }

    /// Re-resolves `host` on every link reset.
    #[must_use]
    pub fn with_peer_host(mut self, host: impl Into<String>) -> Self {
        self.peer_host = Some(host.into());
        self
    }

    /// Runs until shutdown or a fatal device error.
    ///
    /// # Errors
    /// TUN read or write failure.
    pub async fn run(&mut self) -> Result<()> {
        let target = self.session.start(Instant::now());
        self.send_message(&Message::Noop, target).await;

        let result = self.relay().await;
        self.send_disconnect().await;

        info!("Client stopped");
        result
    }

    async fn relay(&mut self) -> Result<()> {
        loop {
            match self.io.next_event().await? {
                RelayEvent::Shutdown => {
                    debug!("Client received shutdown signal");
                    return Ok(());
                }
                RelayEvent::Tick(now) => self.on_tick(now).await,
                RelayEvent::Tun(packet) => self.on_tun_packet(&packet).await,
                RelayEvent::Datagram(datagram, source) => {
                    self.on_datagram(datagram, source).await?;
                }
            }
        }
    }

    async fn on_tick(&mut self, now: Instant) {
        let outcome = self.session.poll(now);

        if outcome.link_reset {
            self.re_resolve().await;
        }

        if outcome.keepalive_due {
            trace!(peer = %self.session.active_peer(), "Sending keepalive");
            self.send_message(&Message::Noop, self.session.active_peer()).await;
        }
    }

    async fn on_tun_packet(&self, packet: &[u8]) {
        match self.handler.seal_ip_packet(packet) {
            Ok(datagram) => {
                self.io.send(&datagram, self.session.active_peer()).await;
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

        match message {
            Message::IpData(data) => {
                self.session.on_authenticated(source.addr, source.timestamp);
                self.io.write_tun(&data.packet).await?;
            }
            Message::Noop => {
                self.session.on_authenticated(source.addr, source.timestamp);
            }
            Message::Disconnect => {
                self.session.on_disconnect(source.timestamp);
                self.re_resolve().await;
                self.on_tick(source.timestamp).await;
            }
        }

        Ok(())
    }

    async fn re_resolve(&mut self) {
        let Some(host) = &self.peer_host else {
            return;
        };

        if let Some(addr) = lookup_within(host, RESOLVE_TIMEOUT, resolve(host)).await {
            self.session.set_configured_peer(addr);
        }
    }

    async fn send_disconnect(&self) {
        let peer = self.session.active_peer();
        let notify = async {
            for _ in 0..DISCONNECT_REPEAT {
                self.send_message(&Message::Disconnect, peer).await;
            }
        };

        if tokio::time::timeout(DISCONNECT_TIMEOUT, notify).await.is_err() {
            debug!(peer = %peer, "Disconnect notification timed out");
        }
    }

    async fn send_message(&self, message: &Message, dest: SocketAddr) {
        match self.handler.seal(message) {
            Ok(datagram) => {
                self.io.send(&datagram, dest).await;
            }
            Err(e) => warn!("Failed to encode {:?}: {}", message, e),
        }
    }

    /// Returns the link state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.session.state()
    }

    /// Returns the session.
    #[must_use]
    pub const fn session(&self) -> &ClientSession {
        &self.session
    }
}

/// Awaits `lookup` for at most `limit`.
///
/// Returns `None` on failure or timeout, both logged.
async fn lookup_within<F>(host: &str, limit: Duration, lookup: F) -> Option<SocketAddr>
where
    F: Future<Output = minivtun_transport::Result<SocketAddr>>,
{
    match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(addr)) => Some(addr),
        Ok(Err(e)) => {
            warn!(host = %host, "Keeping previous peer address: {}", e);
            None
        }
        Err(_) => {
            warn!(host = %host, ?limit, "Peer lookup timed out, keeping previous address");
            None
        }
    }
}

impl<T: Transport, D: TunDevice> std::fmt::Debug for TunnelClient<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelClient")
            .field("session", &self.session)
            .field("peer_host", &self.peer_host)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::sync::broadcast;

    use minivtun_core::IpData;
    use minivtun_transport::tun::MockTun;
    use minivtun_transport::UdpTransport;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn fast_timers() -> LinkTimers {
        LinkTimers {
            keepalive: Duration::from_millis(50),
            reconnect_timeout: Duration::from_millis(400),
        }
    }

    fn handler(passphrase: &str) -> PacketHandler {
        PacketHandler::new(passphrase, true, 1408).unwrap()
    }

    fn ipv4_packet(len: usize) -> Vec<u8> {
        let mut packet = vec![0u8; len];
        packet[0] = 0x45;
        packet
    }

    struct Harness {
        client: TunnelClient<UdpTransport, MockTun>,
        tun: Arc<MockTun>,
        server: UdpTransport,
        shutdown: broadcast::Sender<()>,
    }

    async fn harness(timers: LinkTimers) -> Harness {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let peer = server.local_addr().unwrap();

        let udp = Arc::new(UdpTransport::bind_for_peer(peer).await.unwrap());
        let tun = Arc::new(MockTun::default());
        let (shutdown, rx) = broadcast::channel(1);
        let io = RelayIo::new(udp, Arc::clone(&tun), rx, timers.tick_period());

        Harness {
            client: TunnelClient::new(handler("secret"), peer, timers, io),
            tun,
            server,
            shutdown,
        }
    }

    async fn recv_message(server: &UdpTransport, handler: &PacketHandler) -> (Message, SocketAddr) {
        let mut buf = vec![0u8; 9000];
        let (len, source) = tokio::time::timeout(WAIT, server.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (handler.open(BytesMut::from(&buf[..len])).unwrap(), source.addr)
    }

    #[tokio::test]
    async fn test_keepalives_without_server() {
        let Harness {
            mut client,
            server,
            shutdown,
            ..
        } = harness(fast_timers()).await;
        let peer_handler = handler("secret");

        let task = tokio::spawn(async move {
            client.run().await.unwrap();
            client
        });

        for _ in 0..3 {
            let (message, _) = recv_message(&server, &peer_handler).await;
            assert_eq!(message, Message::Noop);
        }

        shutdown.send(()).unwrap();
        let client = task.await.unwrap();
        assert_eq!(client.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn test_tun_packet_reaches_server() {
        let Harness {
            mut client,
            tun,
            server,
            shutdown,
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");

        let task = tokio::spawn(async move { client.run().await });

        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Noop);

        tun.inject(ipv4_packet(40));
        match recv_message(&server, &peer_handler).await.0 {
            Message::IpData(data) => assert_eq!(&data.packet[..], &ipv4_packet(40)[..]),
            other => panic!("unexpected message {other:?}"),
        }

        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_server_packet_reaches_tun_and_establishes() {
        let Harness {
            mut client,
            tun,
            server,
            shutdown,
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");

        let task = tokio::spawn(async move {
            client.run().await.unwrap();
            client
        });

        let (_, client_addr) = recv_message(&server, &peer_handler).await;
        let data = IpData::from_packet(Bytes::from(ipv4_packet(60))).unwrap();
        let datagram = peer_handler.seal(&Message::IpData(data)).unwrap();
        server.send(&datagram, &client_addr).await.unwrap();

        assert_eq!(tun.next_written(WAIT).await.unwrap(), ipv4_packet(60));

        shutdown.send(()).unwrap();
        let client = task.await.unwrap();
        assert_eq!(client.state(), LinkState::Established);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_ignored() {
        let Harness {
            mut client,
            tun,
            server,
            shutdown,
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");
        let intruder = handler("guess");

        let task = tokio::spawn(async move {
            client.run().await.unwrap();
            client
        });

        let (_, client_addr) = recv_message(&server, &peer_handler).await;
        let data = IpData::from_packet(Bytes::from(ipv4_packet(40))).unwrap();
        let datagram = intruder.seal(&Message::IpData(data)).unwrap();
        server.send(&datagram, &client_addr).await.unwrap();

        assert!(tun.next_written(Duration::from_millis(200)).await.is_none());

        shutdown.send(()).unwrap();
        let client = task.await.unwrap();
        assert_eq!(client.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn test_shutdown_sends_two_disconnects() {
        let Harness {
            mut client,
            server,
            shutdown,
            ..
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");

        let task = tokio::spawn(async move { client.run().await });

        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Noop);
        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Disconnect);
        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Disconnect);
    }

    #[tokio::test]
    async fn test_disconnect_resets_link() {
        let Harness {
            mut client,
            server,
            shutdown,
            ..
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");

        let task = tokio::spawn(async move {
            client.run().await.unwrap();
            client
        });

        let (_, client_addr) = recv_message(&server, &peer_handler).await;
        let noop = peer_handler.seal(&Message::Noop).unwrap();
        server.send(&noop, &client_addr).await.unwrap();
        let disconnect = peer_handler.seal(&Message::Disconnect).unwrap();
        server.send(&disconnect, &client_addr).await.unwrap();

        // The reset makes a keepalive due at once.
        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Noop);

        shutdown.send(()).unwrap();
        let client = task.await.unwrap();
        assert_eq!(client.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn test_lookup_within_gives_up_on_slow_resolver() {
        let started = std::time::Instant::now();
        let stalled = std::future::pending::<minivtun_transport::Result<SocketAddr>>();

        let addr = lookup_within("peer.example:1414", Duration::from_millis(50), stalled).await;

        assert!(addr.is_none());
        assert!(started.elapsed() < WAIT);
    }

    #[tokio::test]
    async fn test_lookup_within_passes_result() {
        let expected: SocketAddr = "192.0.2.7:1414".parse().unwrap();
        let addr = lookup_within("peer.example:1414", WAIT, async { Ok(expected) }).await;
        assert_eq!(addr, Some(expected));

        let failed = async {
            Err(minivtun_transport::TransportError::resolve(
                "peer.example:1414",
                "no records",
            ))
        };
        assert!(lookup_within("peer.example:1414", WAIT, failed).await.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_host_keeps_configured_peer() {
        let Harness {
            client,
            server,
            shutdown,
            ..
        } = harness(LinkTimers::default()).await;
        let mut client = client.with_peer_host("peer.invalid:1414");
        let peer_handler = handler("secret");
        let configured = server.local_addr().unwrap();

        let task = tokio::spawn(async move {
            client.run().await.unwrap();
            client
        });

        let (_, client_addr) = recv_message(&server, &peer_handler).await;
        let disconnect = peer_handler.seal(&Message::Disconnect).unwrap();
        server.send(&disconnect, &client_addr).await.unwrap();

        // The lookup fails or times out; the keepalive still arrives.
        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Noop);

        shutdown.send(()).unwrap();
        let client = task.await.unwrap();
        assert_eq!(client.session().configured_peer(), configured);
    }

    #[tokio::test]
    async fn test_tun_failure_stops_client() {
        let Harness {
            mut client,
            tun,
            server,
            shutdown: _shutdown,
        } = harness(LinkTimers::default()).await;
        let peer_handler = handler("secret");

        tun.fail_reads();
        let err = client.run().await.unwrap_err();
        assert!(err.is_fatal());

        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Noop);
        assert_eq!(recv_message(&server, &peer_handler).await.0, Message::Disconnect);
    }
}
