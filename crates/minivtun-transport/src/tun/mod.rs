// ============================================
// File: crates/minivtun-transport/src/tun/mod.rs
// ============================================
//! # TUN Device Module
//!
//! ## Main Functionality
//! - `linux`: `/dev/net/tun` point-to-point device
//! - `mock`: in-memory device for tests
//!
//! ```text
//!   kernel routing ──► p2p0 ──read──►  relay ──► UDP ──► peer
//!   kernel routing ◄── p2p0 ◄─write──  relay ◄── UDP ◄── peer
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN operations require root or `CAP_NET_ADMIN`
//! - Device names are limited to 15 characters on Linux
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN module structure

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTun;
