// ============================================
// File: crates/minivtun/src/config.rs
// ============================================
//! # Tunnel Configuration
//!
//! ## Creation Reason
//! One immutable structure, built once at startup from a TOML file and
//! command-line overrides, then handed to the runners.
//!
//! ## Main Functionality
//! - `TunnelConfig`: all sections, loading and validation
//! - `Role`: client or server, derived from the network section
//! - `LinkTimers`: keepalive and reconnect timeout as durations
//! - `ConfigOverrides`: the classic single-letter flags
//!
//! ## Configuration Sections
//! - `network`: server listen address, peer `host:port`, client bind
//! - `tun`: interface name pattern, MTU, tunnel addresses
//! - `security`: passphrase, encryption switch
//! - `timers`: keepalive and reconnect timeout (seconds)
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! pid_file = "/run/minivtun.pid"
//!
//! [network]
//! peer_addr = "vpn.example.net:1414"
//!
//! [tun]
//! device_name = "p2p%d"
//! mtu = 1408
//! ipv4 = "10.7.0.2/10.7.0.1"
//!
//! [security]
//! passphrase = "secret"
//!
//! [timers]
//! keepalive_secs = 7
//! reconnect_timeout_secs = 26
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `local_addr` set means server, even if `peer_addr` is set too;
//!   a client picks its own source address with `bind_addr`
//! - An empty passphrase disables encryption but not the digest check
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::info;

use minivtun_transport::traits::{MAX_TUN_MTU, MIN_TUN_MTU};
use minivtun_transport::{Ipv6Cidr, PointToPoint, TunConfig};

use crate::error::{Result, TunnelError};

// ============================================
// TunnelConfig
// ============================================

/// Complete tunnel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// TUN device configuration.
    #[serde(default)]
    pub tun: TunSection,

    /// Passphrase and encryption.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Keepalive and liveness timers.
    #[serde(default)]
    pub timers: TimersConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// PID file written once the interface is up.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

impl TunnelConfig {
    /// Loads and validates a TOML file.
    ///
    /// # Errors
    /// `ConfigLoad` if the file cannot be read or parsed, or any
    /// validation error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TunnelError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TunnelError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        info!("Configuration loaded from {}", path_str);
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// The first invalid field found.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.tun.validate()?;
        self.timers.validate()?;
        Ok(())
    }

    /// Returns which end of the tunnel this process is.
    ///
    /// A listen address makes this the server; otherwise a peer
    /// address makes it the client.
    ///
    /// # Errors
    /// `ConfigMissing` if neither address is set.
    pub fn role(&self) -> Result<Role> {
        match (self.network.local_addr, &self.network.peer_addr) {
            (Some(listen), _) => Ok(Role::Server { listen }),
            (None, Some(peer)) => Ok(Role::Client {
                peer: peer.clone(),
                bind: self.network.bind_addr,
            }),
            (None, None) => Err(TunnelError::config_missing(
                "network.local_addr or network.peer_addr",
            )),
        }
    }

    /// Returns `true` if payloads will be encrypted.
    #[must_use]
    pub fn encryption_enabled(&self) -> bool {
        self.security.encryption && !self.security.passphrase.is_empty()
    }
}

impl FromStr for TunnelConfig {
    type Err = TunnelError;

    fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TunnelError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================
// Role
// ============================================

/// Which end of the tunnel this process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Listens for a client.
    Server {
        /// Bind address.
        listen: SocketAddr,
    },
    /// Keeps a link to a server alive.
    Client {
        /// Server `host:port`.
        peer: String,
        /// Optional local bind address.
        bind: Option<SocketAddr>,
    },
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address; setting it makes this process the server.
    #[serde(default)]
    pub local_addr: Option<SocketAddr>,

    /// Server `host:port`; used when `local_addr` is unset.
    #[serde(default)]
    pub peer_addr: Option<String>,

    /// Client source address; an ephemeral port when unset.
    #[serde(default)]
    pub bind_addr: Option<SocketAddr>,
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if let Some(local) = self.local_addr {
            if local.port() == 0 {
                return Err(TunnelError::config_invalid(
                    "network.local_addr",
                    "server port cannot be 0",
                ));
            }
        }
        if let Some(peer) = &self.peer_addr {
            if !is_host_port(peer) {
                return Err(TunnelError::config_invalid(
                    "network.peer_addr",
                    format!("'{peer}' is not host:port"),
                ));
            }
        }
        Ok(())
    }
}

fn is_host_port(s: &str) -> bool {
    if s.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match s.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok_and(|p| p > 0)
        }
        None => false,
    }
}

// ============================================
// TunSection
// ============================================

/// TUN device configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunSection {
    /// Interface name or kernel pattern.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// MTU, also the largest tunnelled packet.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// IPv4 point-to-point pair, `local/peer`.
    #[serde(default)]
    pub ipv4: Option<String>,

    /// IPv6 address, `addr/prefix`.
    #[serde(default)]
    pub ipv6: Option<String>,
}

fn default_device_name() -> String {
    "p2p%d".to_string()
}

const fn default_mtu() -> u16 {
    1408
}

impl TunSection {
    fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(TunnelError::config_invalid("tun.device_name", "cannot be empty"));
        }

        if self.device_name.len() > 15 {
            return Err(TunnelError::config_invalid(
                "tun.device_name",
                "cannot exceed 15 characters",
            ));
        }

        if !(MIN_TUN_MTU..=MAX_TUN_MTU).contains(&self.mtu) {
            return Err(TunnelError::config_invalid(
                "tun.mtu",
                format!("must be between {MIN_TUN_MTU} and {MAX_TUN_MTU}"),
            ));
        }

        self.to_tun_config().map(|_| ())
    }

    /// Builds the device configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` if an address does not parse.
    pub fn to_tun_config(&self) -> Result<TunConfig> {
        let mut config = TunConfig::new(&self.device_name).with_mtu(self.mtu);

        if let Some(pair) = &self.ipv4 {
            let pair: PointToPoint = pair.parse().map_err(|_| {
                TunnelError::config_invalid("tun.ipv4", format!("'{pair}' is not local/peer"))
            })?;
            config = config.with_ipv4(pair);
        }

        if let Some(cidr) = &self.ipv6 {
            let cidr: Ipv6Cidr = cidr.parse().map_err(|_| {
                TunnelError::config_invalid("tun.ipv6", format!("'{cidr}' is not addr/prefix"))
            })?;
            config = config.with_ipv6(cidr);
        }

        config
            .validate()
            .map_err(|e| TunnelError::config_invalid("tun", e.to_string()))?;
        Ok(config)
    }
}

impl Default for TunSection {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            mtu: default_mtu(),
            ipv4: None,
            ipv6: None,
        }
    }
}

// ============================================
// SecurityConfig
// ============================================

/// Passphrase configuration section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Shared passphrase; empty means no encryption.
    #[serde(default)]
    pub passphrase: String,

    /// Encrypt `IPDATA` payloads.
    #[serde(default = "default_encryption")]
    pub encryption: bool,
}

const fn default_encryption() -> bool {
    true
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            passphrase: String::new(),
            encryption: default_encryption(),
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("passphrase", &"[REDACTED]")
            .field("encryption", &self.encryption)
            .finish()
    }
}

// ============================================
// TimersConfig
// ============================================

/// Timer configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimersConfig {
    /// Seconds between keepalives.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Seconds of silence after which the link is reset (client) or a
    /// peer is expired (server).
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,
}

const fn default_keepalive_secs() -> u64 {
    7
}

const fn default_reconnect_timeout_secs() -> u64 {
    26
}

impl TimersConfig {
    fn validate(&self) -> Result<()> {
        if self.keepalive_secs == 0 {
            return Err(TunnelError::config_invalid(
                "timers.keepalive_secs",
                "must be greater than 0",
            ));
        }

        if self.reconnect_timeout_secs <= self.keepalive_secs {
            return Err(TunnelError::config_invalid(
                "timers.reconnect_timeout_secs",
                "must be greater than keepalive_secs",
            ));
        }

        Ok(())
    }

    /// Returns the timers as durations.
    #[must_use]
    pub const fn link_timers(&self) -> LinkTimers {
        LinkTimers {
            keepalive: Duration::from_secs(self.keepalive_secs),
            reconnect_timeout: Duration::from_secs(self.reconnect_timeout_secs),
        }
    }
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
        }
    }
}

/// Keepalive and liveness durations used by the runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimers {
    /// Interval between keepalives; also the peer sweep interval.
    pub keepalive: Duration,
    /// Silence threshold for link reset and peer expiry.
    pub reconnect_timeout: Duration,
}

impl LinkTimers {
    /// Period of the relay loop's timer tick.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.keepalive.min(Duration::from_secs(1))
    }
}

impl Default for LinkTimers {
    fn default() -> Self {
        TimersConfig::default().link_timers()
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Command-line Overrides
// ============================================

/// Flags that override the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Local IP:port to listen on (makes this the server)
    #[arg(short = 'l', long = "local")]
    pub local: Option<SocketAddr>,

    /// Server host:port to connect to (client, when -l is absent)
    #[arg(short = 'r', long = "remote")]
    pub remote: Option<String>,

    /// Client source IP:port
    #[arg(long = "bind")]
    pub bind: Option<SocketAddr>,

    /// IPv4 point-to-point pair, local/peer
    #[arg(short = 'a', long = "ipv4-addr")]
    pub ipv4: Option<String>,

    /// IPv6 address, addr/prefix
    #[arg(short = 'A', long = "ipv6-addr")]
    pub ipv6: Option<String>,

    /// Interface MTU
    #[arg(short = 'm', long)]
    pub mtu: Option<u16>,

    /// Keepalive interval in seconds
    #[arg(short = 't', long)]
    pub keepalive: Option<u64>,

    /// Interface name or pattern
    #[arg(short = 'n', long = "ifname")]
    pub ifname: Option<String>,

    /// PID file
    #[arg(short = 'p', long = "pidfile")]
    pub pid_file: Option<PathBuf>,

    /// Shared passphrase
    #[arg(short = 'e', long = "key")]
    pub passphrase: Option<String>,

    /// Disable encryption
    #[arg(short = 'N', long = "no-encryption")]
    pub no_encryption: bool,
}

impl ConfigOverrides {
    /// Applies the flags on top of `config` and re-validates it.
    ///
    /// # Errors
    /// Any validation error of the merged configuration.
    pub fn apply(self, config: &mut TunnelConfig) -> Result<()> {
        if let Some(local) = self.local {
            config.network.local_addr = Some(local);
        }
        if let Some(remote) = self.remote {
            config.network.peer_addr = Some(remote);
        }
        if let Some(bind) = self.bind {
            config.network.bind_addr = Some(bind);
        }
        if let Some(ipv4) = self.ipv4 {
            config.tun.ipv4 = Some(ipv4);
        }
        if let Some(ipv6) = self.ipv6 {
            config.tun.ipv6 = Some(ipv6);
        }
        if let Some(mtu) = self.mtu {
            config.tun.mtu = mtu;
        }
        if let Some(keepalive) = self.keepalive {
            config.timers.keepalive_secs = keepalive;
        }
        if let Some(ifname) = self.ifname {
            config.tun.device_name = ifname;
        }
        if let Some(pid_file) = self.pid_file {
            config.pid_file = Some(pid_file);
        }
        if let Some(passphrase) = self.passphrase {
            config.security.passphrase = passphrase;
        }
        if self.no_encryption {
            config.security.encryption = false;
        }
        config.validate()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tun.device_name, "p2p%d");
        assert_eq!(config.tun.mtu, 1408);
        assert_eq!(config.timers.link_timers().keepalive, Duration::from_secs(7));
        assert_eq!(
            config.timers.link_timers().reconnect_timeout,
            Duration::from_secs(26)
        );
        assert!(!config.encryption_enabled());
    }

    #[test]
    fn test_client_config() {
        let config: TunnelConfig = r#"
            pid_file = "/run/minivtun.pid"

            [network]
            peer_addr = "vpn.example.net:1414"

            [tun]
            ipv4 = "10.7.0.2/10.7.0.1"
            ipv6 = "fd00:7::2/64"

            [security]
            passphrase = "secret"
        "#
        .parse()
        .unwrap();

        assert_eq!(
            config.role().unwrap(),
            Role::Client {
                peer: "vpn.example.net:1414".into(),
                bind: None
            }
        );
        assert!(config.encryption_enabled());

        let tun = config.tun.to_tun_config().unwrap();
        assert_eq!(tun.ipv4.unwrap().to_string(), "10.7.0.2/10.7.0.1");
        assert_eq!(tun.ipv6.unwrap().prefix, 64);
    }

    #[test]
    fn test_server_config() {
        let config: TunnelConfig = r#"
            [network]
            local_addr = "0.0.0.0:1414"

            [security]
            passphrase = "secret"
            encryption = false
        "#
        .parse()
        .unwrap();

        assert_eq!(
            config.role().unwrap(),
            Role::Server {
                listen: "0.0.0.0:1414".parse().unwrap()
            }
        );
        assert!(!config.encryption_enabled());
    }

    #[test]
    fn test_local_wins_over_peer() {
        let mut config = TunnelConfig::default();
        config.network.local_addr = Some("0.0.0.0:1414".parse().unwrap());
        config.network.peer_addr = Some("192.0.2.1:1414".into());

        assert_eq!(
            config.role().unwrap(),
            Role::Server {
                listen: "0.0.0.0:1414".parse().unwrap()
            }
        );
    }

    #[test]
    fn test_client_bind_address() {
        let config: TunnelConfig = r#"
            [network]
            peer_addr = "192.0.2.1:1414"
            bind_addr = "0.0.0.0:5000"
        "#
        .parse()
        .unwrap();

        assert_eq!(
            config.role().unwrap(),
            Role::Client {
                peer: "192.0.2.1:1414".into(),
                bind: Some("0.0.0.0:5000".parse().unwrap()),
            }
        );
    }

    #[test]
    fn test_flags_select_server_like_file() {
        let mut config = TunnelConfig::default();
        let overrides = ConfigOverrides {
            local: Some("0.0.0.0:1414".parse().unwrap()),
            remote: Some("192.0.2.1:1414".into()),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config).unwrap();

        assert!(matches!(config.role().unwrap(), Role::Server { .. }));
    }

    #[test]
    fn test_role_requires_an_address() {
        let err = TunnelConfig::default().role().unwrap_err();
        assert!(matches!(err, TunnelError::ConfigMissing { .. }));
    }

    #[test]
    fn test_invalid_values() {
        assert!("[tun]\nmtu = 100".parse::<TunnelConfig>().is_err());
        assert!("[tun]\nipv4 = \"10.7.0.1\"".parse::<TunnelConfig>().is_err());
        assert!("[tun]\nipv6 = \"fd00::1/200\"".parse::<TunnelConfig>().is_err());
        assert!("[tun]\ndevice_name = \"a-very-long-device\"".parse::<TunnelConfig>().is_err());
        assert!("[network]\npeer_addr = \"no-port\"".parse::<TunnelConfig>().is_err());
        assert!("[network]\nlocal_addr = \"0.0.0.0:0\"".parse::<TunnelConfig>().is_err());
        assert!("[timers]\nkeepalive_secs = 0".parse::<TunnelConfig>().is_err());
        assert!("[timers]\nkeepalive_secs = 30".parse::<TunnelConfig>().is_err());
    }

    #[test]
    fn test_host_port() {
        assert!(is_host_port("192.0.2.1:1414"));
        assert!(is_host_port("[2001:db8::1]:1414"));
        assert!(is_host_port("vpn.example.net:1414"));
        assert!(!is_host_port("vpn.example.net"));
        assert!(!is_host_port(":1414"));
        assert!(!is_host_port("2001:db8::1"));
    }

    #[test]
    fn test_overrides() {
        let mut config = TunnelConfig::default();
        let overrides = ConfigOverrides {
            remote: Some("192.0.2.1:1414".into()),
            ipv4: Some("10.7.0.2/10.7.0.1".into()),
            mtu: Some(1300),
            keepalive: Some(5),
            passphrase: Some("secret".into()),
            no_encryption: true,
            ..ConfigOverrides::default()
        };

        overrides.apply(&mut config).unwrap();

        assert_eq!(config.network.peer_addr.as_deref(), Some("192.0.2.1:1414"));
        assert_eq!(config.tun.mtu, 1300);
        assert_eq!(config.timers.keepalive_secs, 5);
        assert_eq!(config.security.passphrase, "secret");
        assert!(!config.encryption_enabled());
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = TunnelConfig::default();
        let overrides = ConfigOverrides {
            keepalive: Some(60),
            ..ConfigOverrides::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }

    #[test]
    fn test_passphrase_not_in_debug() {
        let mut config = TunnelConfig::default();
        config.security.passphrase = "hunter2".into();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(LinkTimers::default().tick_period(), Duration::from_secs(1));
        let fast = LinkTimers {
            keepalive: Duration::from_millis(50),
            reconnect_timeout: Duration::from_millis(200),
        };
        assert_eq!(fast.tick_period(), Duration::from_millis(50));
    }
}
