// ============================================
// File: crates/minivtun-transport/src/lib.rs
// ============================================
//! # minivtun Transport - Network I/O Layer
//!
//! ## Creation Reason
//! Wraps the two I/O edges of the tunnel, the UDP socket toward the
//! remote endpoint and the TUN interface toward the kernel, behind
//! traits the relay loops are generic over.
//!
//! ## Main Functionality
//! - [`traits`]: `Transport`, `TunDevice`, `TunConfig`
//! - [`udp`]: UDP socket and name resolution
//! - [`tun`]: Linux TUN device and the test mock
//! - [`error`]: transport error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    minivtun                         │
//! │                       │                             │
//! │         ┌─────────────┴─────────────┐               │
//! │         ▼                           ▼               │
//! │   minivtun-core             minivtun-transport      │
//! │                             You are here ◄──        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Platform Support
//! | Platform | UDP | TUN |
//! |----------|-----|-----|
//! | Linux | ✅ | ✅ |
//! | Other unix | ✅ | ❌ |
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN operations require elevated privileges
//! - The mock device is behind the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod traits;
pub mod tun;
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{Ipv6Cidr, PacketSource, PointToPoint, Transport, TunConfig, TunDevice};
pub use udp::{resolve, UdpTransport};

#[cfg(target_os = "linux")]
pub use tun::linux::LinuxTun;
