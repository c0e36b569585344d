// ============================================
// File: crates/minivtun/src/services/session.rs
// ============================================
//! # Client Session
//!
//! ## Creation Reason
//! Keeps the client's view of the link: which address the server is
//! believed to be at, when it last answered, and when the next
//! keepalive is due. Liveness over UDP is purely timer-driven.
//!
//! ## Main Functionality
//! - `ClientSession`: clock-injected state machine
//! - `LinkState`: `Connecting` / `Established`
//! - `TickOutcome`: what the relay loop must do after a timer tick
//!
//! ## Session Lifecycle
//! ```text
//!            start()
//!               │  keepalive to configured peer
//!               ▼
//!        ┌────────────┐  authenticated datagram  ┌─────────────┐
//!        │ Connecting │ ───────────────────────► │ Established │
//!        └────────────┘                          └──────┬──────┘
//!               ▲      silence > reconnect timeout      │
//!               └──────────── or DISCONNECT ────────────┘
//!                 (active peer := configured peer)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No backoff: after a reset, keepalives resume at the normal cadence
//! - Every method takes `now`; never read the clock in here
//!
//! ## Last Modified
//! v0.1.0 - Initial client session

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LinkTimers;

// ============================================
// LinkState
// ============================================

/// Observable link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No authenticated datagram since start or the last reset.
    Connecting,
    /// The peer has answered within the reconnect timeout.
    Established,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Established => write!(f, "established"),
        }
    }
}

/// Actions requested by [`ClientSession::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// The link timed out and was reset; a host-name peer should be
    /// re-resolved.
    pub link_reset: bool,
    /// A keepalive must be sent to the active peer now.
    pub keepalive_due: bool,
}

// ============================================
// ClientSession
// ============================================

/// Client-side link state machine.
#[derive(Debug, Clone)]
pub struct ClientSession {
    configured_peer: SocketAddr,
    active_peer: SocketAddr,
    state: LinkState,
    last_rx: Instant,
    last_keepalive: Option<Instant>,
    keepalive: Duration,
    reconnect_timeout: Duration,
}

impl ClientSession {
    /// Creates a session toward `peer`.
    #[must_use]
    pub fn new(peer: SocketAddr, timers: LinkTimers, now: Instant) -> Self {
        Self {
            configured_peer: peer,
            active_peer: peer,
            state: LinkState::Connecting,
            last_rx: now,
            last_keepalive: None,
            keepalive: timers.keepalive,
            reconnect_timeout: timers.reconnect_timeout,
        }
    }

    /// Enters `Connecting` and returns where the first keepalive goes.
    pub fn start(&mut self, now: Instant) -> SocketAddr {
        self.state = LinkState::Connecting;
        self.active_peer = self.configured_peer;
        self.last_rx = now;
        self.last_keepalive = Some(now);
        info!(peer = %self.configured_peer, "Connecting");
        self.active_peer
    }

    /// Records an authenticated datagram from `source`.
    pub fn on_authenticated(&mut self, source: SocketAddr, now: Instant) {
        self.last_rx = now;

        if source != self.active_peer {
            info!(from = %self.active_peer, to = %source, "Peer address changed");
            self.active_peer = source;
        }

        if self.state != LinkState::Established {
            self.state = LinkState::Established;
            info!(peer = %self.active_peer, "Link established");
        }
    }

    /// Handles a `DISCONNECT` from the peer.
    pub fn on_disconnect(&mut self, now: Instant) {
        info!(peer = %self.active_peer, "Peer sent disconnect");
        self.reset(now);
    }

    /// Advances the timers.
    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if now.saturating_duration_since(self.last_rx) > self.reconnect_timeout {
            warn!(
                peer = %self.active_peer,
                timeout_secs = self.reconnect_timeout.as_secs_f32(),
                "Link timed out, reconnecting"
            );
            self.reset(now);
            outcome.link_reset = true;
        }

        let due = self
            .last_keepalive
            .map_or(true, |sent| now.saturating_duration_since(sent) >= self.keepalive);
        if due {
            self.last_keepalive = Some(now);
            outcome.keepalive_due = true;
        }

        outcome
    }

    /// Replaces the configured peer, e.g. after re-resolving its name.
    pub fn set_configured_peer(&mut self, peer: SocketAddr) {
        if peer != self.configured_peer {
            debug!(from = %self.configured_peer, to = %peer, "Configured peer updated");
        }
        self.configured_peer = peer;
        if self.state == LinkState::Connecting {
            self.active_peer = peer;
        }
    }

    fn reset(&mut self, now: Instant) {
        self.state = LinkState::Connecting;
        self.active_peer = self.configured_peer;
        self.last_rx = now;
        self.last_keepalive = None;
    }

    /// Returns the link state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns the address datagrams are currently sent to.
    #[must_use]
    pub const fn active_peer(&self) -> SocketAddr {
        self.active_peer
    }

    /// Returns the operator-supplied peer address.
    #[must_use]
    pub const fn configured_peer(&self) -> SocketAddr {
        self.configured_peer
    }

    /// Returns when the last authenticated datagram arrived.
    #[must_use]
    pub const fn last_rx(&self) -> Instant {
        self.last_rx
    }
}

// ============================================
// Tests
// ============================================
