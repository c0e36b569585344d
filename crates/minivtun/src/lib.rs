// ============================================
// File: crates/minivtun/src/lib.rs
// ============================================
//! # minivtun Library
//!
//! ## Creation Reason
//! Runs one end of a minivtun tunnel: IP packets read from a TUN
//! interface travel as authenticated, optionally encrypted UDP
//! datagrams to the other end and are written to its interface.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: configuration file and command-line overrides
//! - [`tunnel`]: process lifecycle and wiring
//! - [`client`] / [`server`]: the two runners
//! - [`relay`]: readiness multiplexing shared by both runners
//! - [`services`]: link state
//!   - [`services::session`]: client keepalive / reconnect
//!   - [`services::peers`]: server endpoint table
//! - [`handlers`]: datagram sealing and opening
//! - [`error`]: tunnel error types
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Tunnel                           │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌────────────┐    ┌──────────────────┐    ┌─────────┐  │
//! │  │   Config   │───►│ Client / Server  │───►│ Handler │  │
//! │  └────────────┘    └────────┬─────────┘    └─────────┘  │
//! │                             │                            │
//! │              ┌──────────────┴─────────────┐              │
//! │              ▼                            ▼              │
//! │      ┌───────────────┐           ┌───────────────┐       │
//! │      │ ClientSession │           │   PeerTable   │       │
//! │      └───────────────┘           └───────────────┘       │
//! │                                                          │
//! ├──────────────────────────────────────────────────────────┤
//! │                       RelayIo                            │
//! │   ┌──────────────────┐          ┌──────────────────┐    │
//! │   │  UDP Transport   │          │    TUN Device    │    │
//! │   └──────────────────┘          └──────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! TUN → seal (digest, encrypt) → UDP → peer
//! peer → UDP → open (verify, decrypt) → TUN
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Creating the interface requires root or CAP_NET_ADMIN
//! - One process is one tunnel endpoint; there is no multi-peer routing
//! - Configuration changes require restart
//!
//! ## Last Modified
//! v0.1.0 - Initial tunnel library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod server;
pub mod services;
pub mod tunnel;

// Re-export primary types
pub use client::TunnelClient;
pub use config::{ConfigOverrides, LinkTimers, Role, TunnelConfig};
pub use error::{Result, TunnelError};
pub use server::TunnelServer;
pub use tunnel::{Link, Tunnel};
