// ============================================
// File: crates/minivtun/src/services/mod.rs
// ============================================
//! # Link Services
//!
//! ## Main Functionality
//! - [`peers`]: server-side endpoint table
//! - [`session`]: client-side keepalive / reconnect state machine
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both are plain owned values mutated by one relay loop; keep I/O
//!   and clock reads out of them so they stay unit-testable
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod peers;
pub mod session;

pub use peers::{PeerEntry, PeerId, PeerTable};
pub use session::{ClientSession, LinkState, TickOutcome};
