// ============================================
// File: crates/minivtun/src/services/peers.rs
// ============================================
//! # Peer Table
//!
//! ## Creation Reason
//! The server has no handshake, so the only thing telling it where a
//! client lives is the source address of the client's last
//! authenticated datagram. This table remembers that address.
//!
//! ## Main Functionality
//! - `PeerId`: tunnel identity, derived from the passphrase digest
//! - `PeerTable::observe`: create or refresh an entry
//! - `PeerTable::route_lookup` / `most_recent`: pick a send target
//! - `PeerTable::sweep`: drop silent peers
//!
//! ## Entry Lifecycle
//! ```text
//!   first valid datagram ──► observe() ──► entry { endpoint, last_seen }
//!   later datagram from E2 ─► observe() ──► endpoint = E2 (NAT rebinding)
//!   now - last_seen > staleness ──► invisible to lookups
//!   sweep() / DISCONNECT ──► removed
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One shared passphrase means one identity: two clients behind the
//!   same passphrase collapse into a single entry that follows whoever
//!   spoke last
//! - Owned by the relay loop alone, so there is no locking
//!
//! ## Last Modified
//! v0.1.0 - Initial peer table

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use minivtun_core::AuthDigest;

// ============================================
// PeerId
// ============================================

/// Identity of a tunnel peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 16]);

impl PeerId {
    /// Derives the identity from an authenticated digest.
    #[must_use]
    pub fn from_digest(digest: &AuthDigest) -> Self {
        Self(*digest.as_bytes())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

// ============================================
// PeerEntry
// ============================================

/// Where a peer was last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    /// Source address of the last authenticated datagram.
    pub endpoint: SocketAddr,
    /// When that datagram arrived.
    pub last_seen: Instant,
}

impl PeerEntry {
    fn is_stale(&self, now: Instant, staleness: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > staleness
    }
}

// ============================================
// PeerTable
// ============================================

/// Endpoint table of the server.
#[derive(Debug, Default)]
pub struct PeerTable {
    entries: HashMap<PeerId, PeerEntry>,
}

impl PeerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an authenticated datagram from `endpoint`.
    pub fn observe(&mut self, id: PeerId, endpoint: SocketAddr, now: Instant) -> PeerId {
        let entry = PeerEntry {
            endpoint,
            last_seen: now,
        };

        match self.entries.insert(id, entry) {
            None => info!(peer = %id, endpoint = %endpoint, "Peer connected"),
            Some(previous) if previous.endpoint != endpoint => info!(
                peer = %id,
                from = %previous.endpoint,
                to = %endpoint,
                "Peer endpoint changed"
            ),
            Some(_) => {}
        }

        id
    }

    /// Returns the endpoint of `id` unless it has gone stale.
    #[must_use]
    pub fn route_lookup(&self, id: &PeerId, now: Instant, staleness: Duration) -> Option<SocketAddr> {
        self.entries
            .get(id)
            .filter(|entry| !entry.is_stale(now, staleness))
            .map(|entry| entry.endpoint)
    }

    /// Returns the endpoint of the most recently heard, non-stale peer.
    #[must_use]
    pub fn most_recent(&self, now: Instant, staleness: Duration) -> Option<SocketAddr> {
        self.entries
            .values()
            .filter(|entry| !entry.is_stale(now, staleness))
            .max_by_key(|entry| entry.last_seen)
            .map(|entry| entry.endpoint)
    }

    /// Removes a peer.
    pub fn remove(&mut self, id: &PeerId) -> Option<PeerEntry> {
        let removed = self.entries.remove(id);
        if let Some(entry) = removed {
            info!(peer = %id, endpoint = %entry.endpoint, "Peer disconnected");
        }
        removed
    }

    /// Removes every stale entry and returns their ids.
    pub fn sweep(&mut self, now: Instant, staleness: Duration) -> Vec<PeerId> {
        let expired: Vec<PeerId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_stale(now, staleness))
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                info!(peer = %id, endpoint = %entry.endpoint, "Peer timed out");
            }
        }

        debug!(active = self.entries.len(), expired = expired.len(), "Peer sweep complete");
        expired
    }

    /// Returns the entry of `id`, stale or not.
    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<&PeerEntry> {
        self.entries.get(id)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const STALENESS: Duration = Duration::from_secs(26);

    fn peer(byte: u8) -> PeerId {
        PeerId::from_digest(&AuthDigest::from_bytes([byte; 16]))
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 1], port))
    }

    #[test]
    fn test_observe_creates_entry() {
        let mut table = PeerTable::new();
        let now = Instant::now();

        let id = table.observe(peer(1), addr(4000), now);

        assert_eq!(table.len(), 1);
        assert_eq!(table.route_lookup(&id, now, STALENESS), Some(addr(4000)));
    }

    #[test]
    fn test_observe_follows_endpoint_change() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();

        table.observe(peer(1), addr(4000), t0);
        table.observe(peer(1), addr(5000), t0 + Duration::from_secs(3));

        assert_eq!(table.len(), 1);
        let later = t0 + Duration::from_secs(4);
        assert_eq!(table.route_lookup(&peer(1), later, STALENESS), Some(addr(5000)));
        assert_eq!(table.most_recent(later, STALENESS), Some(addr(5000)));
    }

    #[test]
    fn test_stale_entry_hidden_before_sweep() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();
        table.observe(peer(1), addr(4000), t0);

        let at_limit = t0 + STALENESS;
        assert_eq!(table.route_lookup(&peer(1), at_limit, STALENESS), Some(addr(4000)));

        let past = t0 + STALENESS + Duration::from_secs(1);
        assert_eq!(table.route_lookup(&peer(1), past, STALENESS), None);
        assert_eq!(table.most_recent(past, STALENESS), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_stale() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();
        table.observe(peer(1), addr(4000), t0);
        table.observe(peer(2), addr(4001), t0 + Duration::from_secs(20));

        let now = t0 + Duration::from_secs(30);
        let expired = table.sweep(now, STALENESS);

        assert_eq!(expired, vec![peer(1)]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&peer(1)).is_none());
        assert_eq!(table.route_lookup(&peer(2), now, STALENESS), Some(addr(4001)));
    }

    #[test]
    fn test_most_recent_prefers_latest() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();
        table.observe(peer(1), addr(4000), t0);
        table.observe(peer(2), addr(4001), t0 + Duration::from_secs(1));

        let now = t0 + Duration::from_secs(2);
        assert_eq!(table.most_recent(now, STALENESS), Some(addr(4001)));
    }

    #[test]
    fn test_remove() {
        let mut table = PeerTable::new();
        let now = Instant::now();
        table.observe(peer(1), addr(4000), now);

        assert!(table.remove(&peer(1)).is_some());
        assert!(table.remove(&peer(1)).is_none());
        assert!(table.is_empty());
        assert_eq!(table.most_recent(now, STALENESS), None);
    }

    #[test]
    fn test_peer_id_display() {
        let id = peer(0xab);
        assert_eq!(id.to_string(), "abababab");
        assert_eq!(format!("{id:?}"), "PeerId(abababab)");
    }
}
