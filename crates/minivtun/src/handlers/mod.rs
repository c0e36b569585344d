// ============================================
// File: crates/minivtun/src/handlers/mod.rs
// ============================================
//! # Packet Handlers
//!
//! ## Main Functionality
//! - [`packet`]: datagram sealing and opening
//!
//! ## Data Flow
//! ```text
//! TUN → seal_ip_packet → UDP
//! UDP → open → IPDATA → TUN
//!            → NOOP / DISCONNECT → session or peer table
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod packet;

pub use packet::{log_dropped, PacketHandler, MAX_DATAGRAM_SIZE};
