// ============================================
// File: crates/minivtun/src/tunnel.rs
// ============================================
//! # Tunnel Orchestrator
//!
//! ## Creation Reason
//! Wires configuration, socket, interface and runner together and owns
//! the process lifecycle around them.
//!
//! ## Main Functionality
//! - `Tunnel::run`: bind, create the interface, run client or server
//! - `Tunnel::run_link`: the runner part, generic over the I/O edges
//! - Signal handling (SIGINT, SIGTERM) and the PID file
//!
//! ## Startup Sequence
//! ```text
//! 1. Decide the role: local_addr → server, else peer_addr → client
//! 2. Server: bind to local_addr
//!    Client: resolve the peer, bind to bind_addr or an ephemeral port
//! 3. Create the TUN device, assign addresses, bring it up
//! 4. Write the PID file
//! 5. Relay until a signal or a fatal device error
//! 6. Bring the device down, remove the PID file
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Everything runs on the caller's runtime; `main` uses a
//!   current-thread runtime and nothing here spawns relay work
//! - Any failure before step 5 is `StartupFailed`
//!
//! ## Last Modified
//! v0.1.0 - Initial orchestrator

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use minivtun_transport::{Transport, TunDevice};

use crate::client::TunnelClient;
use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::handlers::PacketHandler;
use crate::relay::RelayIo;
use crate::server::TunnelServer;

// ============================================
// Link
// ============================================

/// Resolved role handed to [`Tunnel::run_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Serve whoever authenticates.
    Server,
    /// Keep a link to `peer`.
    Client {
        /// Resolved server address.
        peer: SocketAddr,
        /// The address as configured, re-resolved on reset if it is a
        /// host name.
        host: String,
    },
}

// ============================================
// Tunnel
// ============================================

/// One tunnel endpoint.
///
/// # Lifecycle
/// 1. Create with `Tunnel::new(config)`
/// 2. Start with `tunnel.run().await`
/// 3. Stop with a signal or `tunnel.shutdown()`
pub struct Tunnel {
    config: TunnelConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Tunnel {
    /// Creates a tunnel from a validated configuration.
    #[must_use]
    pub fn new(config: TunnelConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            shutdown_tx,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Runs the tunnel until shutdown.
    ///
    /// # Errors
    /// Startup failures and fatal device errors.
    #[cfg(target_os = "linux")]
    pub async fn run(&self) -> Result<()> {
        use minivtun_transport::{resolve, LinuxTun, UdpTransport};

        use crate::config::Role;

        info!("Starting minivtun v{}", env!("CARGO_PKG_VERSION"));

        let (udp, link) = match self.config.role()? {
            Role::Server { listen } => {
                if let Some(peer) = &self.config.network.peer_addr {
                    warn!(peer = %peer, "Listen address set; ignoring peer address");
                }
                let udp = UdpTransport::bind_addr(listen)
                    .await
                    .map_err(|e| TunnelError::startup_failed(format!("UDP bind failed: {e}")))?;
                (udp, Link::Server)
            }
            Role::Client { peer, bind } => {
                let addr = resolve(&peer)
                    .await
                    .map_err(|e| TunnelError::startup_failed(format!("Cannot resolve peer: {e}")))?;
                let udp = match bind {
                    Some(bind) => UdpTransport::bind_addr(bind).await,
                    None => UdpTransport::bind_for_peer(addr).await,
                }
                .map_err(|e| TunnelError::startup_failed(format!("UDP bind failed: {e}")))?;
                (udp, Link::Client { peer: addr, host: peer })
            }
        };
        let udp = Arc::new(udp);

        let tun = LinuxTun::create(self.config.tun.to_tun_config()?)
            .map_err(|e| TunnelError::startup_failed(format!("TUN creation failed: {e}")))?;
        tun.up()
            .await
            .map_err(|e| TunnelError::startup_failed(format!("TUN activation failed: {e}")))?;
        let tun = Arc::new(tun);

        info!(device = %tun.name(), mtu = tun.mtu(), "TUN device ready");

        let pid_file = match &self.config.pid_file {
            Some(path) => Some(PidFile::create(path).await?),
            None => None,
        };

        let signals = tokio::spawn(forward_signals(self.shutdown_tx.clone()));

        let result = self.run_link(link, Arc::clone(&udp), Arc::clone(&tun)).await;

        signals.abort();
        if let Err(e) = tun.down().await {
            warn!("TUN shutdown error: {}", e);
        }
        if let Err(e) = udp.shutdown().await {
            warn!("UDP shutdown error: {}", e);
        }
        drop(pid_file);

        info!("Tunnel shutdown complete");
        result
    }

    /// TUN devices are only available on Linux.
    ///
    /// # Errors
    /// Always `StartupFailed`.
    #[cfg(not(target_os = "linux"))]
    pub async fn run(&self) -> Result<()> {
        Err(TunnelError::startup_failed(
            "TUN devices are only supported on Linux",
        ))
    }

    /// Runs the client or server over already prepared I/O edges.
    ///
    /// # Errors
    /// Key derivation failure or a fatal device error.
    pub async fn run_link<T, D>(&self, link: Link, udp: Arc<T>, tun: Arc<D>) -> Result<()>
    where
        T: Transport + 'static,
        D: TunDevice + 'static,
    {
        let handler = PacketHandler::new(
            &self.config.security.passphrase,
            self.config.security.encryption,
            usize::from(self.config.tun.mtu),
        )?;

        if !handler.encryption_enabled() {
            warn!("Encryption is disabled, tunnel payloads are sent in the clear");
        }

        let timers = self.config.timers.link_timers();
        let io = RelayIo::new(udp, tun, self.shutdown_tx.subscribe(), timers.tick_period());

        match link {
            Link::Server => TunnelServer::new(handler, timers, io).run().await,
            Link::Client { peer, host } => {
                let mut client = TunnelClient::new(handler, peer, timers, io);
                if host.parse::<SocketAddr>().is_err() {
                    client = client.with_peer_host(host);
                }
                client.run().await
            }
        }
    }

    /// Requests shutdown of a running tunnel.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("network", &self.config.network)
            .field("tun", &self.config.tun.device_name)
            .finish_non_exhaustive()
    }
}

// ============================================
// Process Edges
// ============================================

/// Waits for SIGINT or SIGTERM and broadcasts shutdown.
async fn forward_signals(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
}

/// PID file removed when dropped.
#[derive(Debug)]
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    async fn create(path: &Path) -> Result<Self> {
        tokio::fs::write(path, format!("{}\n", std::process::id()))
            .await
            .map_err(|e| {
                TunnelError::startup_failed(format!("Cannot write PID file {}: {e}", path.display()))
            })?;
        debug!(path = %path.display(), "PID file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Cannot remove PID file: {}", e);
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use minivtun_transport::tun::MockTun;
    use minivtun_transport::UdpTransport;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn config(passphrase: &str) -> TunnelConfig {
        let mut config = TunnelConfig::default();
        config.security.passphrase = passphrase.into();
        config
    }

    fn ipv4_packet(len: usize, marker: u8) -> Vec<u8> {
        let mut packet = vec![0u8; len];
        packet[0] = 0x45;
        packet[len - 1] = marker;
        packet
    }

    #[tokio::test]
    async fn test_end_to_end_over_loopback() {
        let server_udp = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server_udp.local_addr().unwrap();
        let server_tun = Arc::new(MockTun::default());
        let server = Arc::new(Tunnel::new(config("secret")));

        let client_udp = Arc::new(UdpTransport::bind_for_peer(server_addr).await.unwrap());
        let client_tun = Arc::new(MockTun::default());
        let client = Arc::new(Tunnel::new(config("secret")));

        let server_task = {
            let server = Arc::clone(&server);
            let (udp, tun) = (Arc::clone(&server_udp), Arc::clone(&server_tun));
            tokio::spawn(async move { server.run_link(Link::Server, udp, tun).await })
        };
        let client_task = {
            let client = Arc::clone(&client);
            let (udp, tun) = (Arc::clone(&client_udp), Arc::clone(&client_tun));
            let link = Link::Client {
                peer: server_addr,
                host: server_addr.to_string(),
            };
            tokio::spawn(async move { client.run_link(link, udp, tun).await })
        };

        // The initial keepalive teaches the server where the client is.
        tokio::time::sleep(Duration::from_millis(100)).await;

        client_tun.inject(ipv4_packet(40, 1));
        assert_eq!(server_tun.next_written(WAIT).await.unwrap(), ipv4_packet(40, 1));

        server_tun.inject(ipv4_packet(100, 2));
        assert_eq!(client_tun.next_written(WAIT).await.unwrap(), ipv4_packet(100, 2));

        client.shutdown();
        client_task.await.unwrap().unwrap();
        server.shutdown();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_passphrase_mismatch_blocks_traffic() {
        let server_udp = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server_udp.local_addr().unwrap();
        let server_tun = Arc::new(MockTun::default());
        let server = Arc::new(Tunnel::new(config("secret")));

        let client_udp = Arc::new(UdpTransport::bind_for_peer(server_addr).await.unwrap());
        let client_tun = Arc::new(MockTun::default());
        let client = Arc::new(Tunnel::new(config("other")));

        let server_task = {
            let server = Arc::clone(&server);
            let tun = Arc::clone(&server_tun);
            tokio::spawn(async move { server.run_link(Link::Server, server_udp, tun).await })
        };
        let client_task = {
            let client = Arc::clone(&client);
            let tun = Arc::clone(&client_tun);
            let link = Link::Client {
                peer: server_addr,
                host: server_addr.to_string(),
            };
            tokio::spawn(async move { client.run_link(link, client_udp, tun).await })
        };

        client_tun.inject(ipv4_packet(40, 1));
        assert!(server_tun
            .next_written(Duration::from_millis(300))
            .await
            .is_none());

        client.shutdown();
        client_task.await.unwrap().unwrap();
        server.shutdown();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pid_file_lifecycle() {
        let path = std::env::temp_dir().join(format!("minivtun-test-{}.pid", std::process::id()));

        let pid_file = PidFile::create(&path).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[cfg(not(target_os = "linux"))]
    #[tokio::test]
    async fn test_run_unsupported_platform() {
        let err = Tunnel::new(config("secret")).run().await.unwrap_err();
        assert!(matches!(err, TunnelError::StartupFailed { .. }));
    }
}
