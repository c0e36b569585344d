// ============================================
// File: crates/minivtun/src/main.rs
// ============================================
//! # minivtun Entry Point
//!
//! ## Creation Reason
//! Binary entry point: CLI parsing, configuration, logging, then one
//! tunnel endpoint on a current-thread runtime.
//!
//! ## Usage
//! ```bash
//! # Server
//! minivtun start -l 0.0.0.0:1414 -a 10.7.0.1/10.7.0.2 -e secret
//!
//! # Client
//! minivtun start -r vpn.example.net:1414 -a 10.7.0.2/10.7.0.1 -e secret
//!
//! # Check a configuration file
//! minivtun validate --config /etc/minivtun/minivtun.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Requires root or CAP_NET_ADMIN for the TUN device
//! - Flags override the configuration file; a missing file means
//!   defaults plus flags
//! - No daemon mode; run under a service manager
//! - Exit status 2 means a configuration error, 1 any other failure
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use minivtun::handlers::PacketHandler;
use minivtun::{ConfigOverrides, Role, Tunnel, TunnelConfig, TunnelError};

// ============================================
// CLI Definition
// ============================================

/// Minimal encrypted point-to-point UDP tunnel
#[derive(Parser, Debug)]
#[command(name = "minivtun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the tunnel
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/minivtun/minivtun.toml")]
        config: PathBuf,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Validate configuration
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/minivtun/minivtun.toml")]
        config: PathBuf,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config, overrides } => cmd_start(&config, overrides).await,
        Commands::Validate { config, overrides } => cmd_validate(&config, overrides).await,
    };

    if let Err(e) = result {
        init_logging("info");
        error!("{:#}", e);

        let code = e
            .downcast_ref::<TunnelError>()
            .map_or(1, TunnelError::exit_code);
        if code == 2 {
            error!("Check the configuration with `minivtun validate`");
        }
        std::process::exit(code);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the tunnel.
async fn cmd_start(config_path: &Path, overrides: ConfigOverrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides).await?;
    init_logging(&config.logging.level);

    info!("Starting minivtun...");
    let tunnel = Tunnel::new(config);
    tunnel.run().await?;

    Ok(())
}

/// Validates the configuration and prints what would run.
async fn cmd_validate(config_path: &Path, overrides: ConfigOverrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides).await?;
    let role = config.role()?;
    let tun = config.tun.to_tun_config()?;
    let handler = PacketHandler::new(
        &config.security.passphrase,
        config.security.encryption,
        usize::from(config.tun.mtu),
    )?;

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    match role {
        Role::Server { listen } => println!("   Server:     listening on {listen}"),
        Role::Client { peer, bind } => {
            println!("   Client:     connecting to {peer}");
            if let Some(bind) = bind {
                println!("   Bind:       {bind}");
            }
        }
    }
    println!();
    println!("TUN:");
    println!("   Device:     {}", tun.name);
    println!("   MTU:        {}", tun.mtu);
    if let Some(ipv4) = tun.ipv4 {
        println!("   IPv4:       {ipv4}");
    }
    if let Some(ipv6) = tun.ipv6 {
        println!("   IPv6:       {ipv6}");
    }
    println!();
    println!("Security:");
    println!(
        "   Encryption: {}",
        if handler.encryption_enabled() { "AES-128-CBC" } else { "disabled" }
    );
    println!("   Digest:     {}", handler.digest().fingerprint());
    println!();
    println!("Timers:");
    println!("   Keepalive:  {}s", config.timers.keepalive_secs);
    println!("   Reconnect:  {}s", config.timers.reconnect_timeout_secs);
    if let Some(pid_file) = &config.pid_file {
        println!();
        println!("PID file:     {}", pid_file.display());
    }
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber; later calls are no-ops.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads the configuration file, if present, and applies the flags.
async fn load_config(path: &Path, overrides: ConfigOverrides) -> anyhow::Result<TunnelConfig> {
    let mut config = if path.exists() {
        TunnelConfig::load(path).await?
    } else {
        TunnelConfig::default()
    };

    overrides.apply(&mut config)?;
    Ok(config)
}
