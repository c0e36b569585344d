// ============================================
// File: crates/minivtun-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! The tunnel touches the outside world through exactly two handles: a
//! UDP socket and a TUN device. Errors are grouped by which of the two
//! raised them, because that alone decides what the relay loop does.
//!
//! ## Main Functionality
//! - `TransportError`: socket, device and settings errors
//! - `Edge`: which handle an error belongs to
//! - `is_recoverable` / `is_device_error`: the relay loop's only questions
//!
//! ## Error Handling Policy
//! | Edge     | Runtime error            | Effect                     |
//! |----------|--------------------------|----------------------------|
//! | Socket   | `Send`, `Recv`           | logged, datagram abandoned |
//! | Socket   | `Bind`, `Resolve`        | startup fails              |
//! | Device   | any                      | tunnel stops               |
//! | Settings | `Invalid`, `Io`          | startup fails              |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Keep `Send` and `Recv` the only recoverable variants; the relay
//!   loop retries on exactly those and nothing else
//! - `Closed` is what a socket returns after `shutdown`; it is not
//!   recoverable, so a runner reading a closed socket stops
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// Edge
// ============================================

/// The I/O handle an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The UDP socket, including name resolution.
    Socket,
    /// The TUN device.
    Device,
    /// Neither: bad settings or local system calls.
    Settings,
}

/// Direction of a failed device transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    /// Reading a packet from the interface.
    Read,
    /// Writing a packet to the interface.
    Write,
}

impl std::fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

// ============================================
// TransportError
// ============================================

/// Errors raised by the socket or the device.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The socket could not be bound.
    #[error("cannot bind UDP socket to {addr}: {source}")]
    Bind {
        /// Requested local address.
        addr: SocketAddr,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// A `host:port` string did not yield an address.
    #[error("cannot resolve '{host}': {reason}")]
    Resolve {
        /// The string as configured.
        host: String,
        /// Resolver message.
        reason: String,
    },

    /// One datagram could not be sent.
    #[error("UDP send to {dest} failed: {source}")]
    Send {
        /// Destination endpoint.
        dest: SocketAddr,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// One datagram could not be received.
    #[error("UDP receive failed: {0}")]
    Recv(#[source] io::Error),

    /// The socket was shut down locally.
    #[error("UDP socket is closed")]
    Closed,

    /// The interface could not be created.
    #[error("cannot create TUN device '{name}': {reason}")]
    DeviceCreate {
        /// Requested name or pattern.
        name: String,
        /// What went wrong; mentions `CAP_NET_ADMIN` when it is missing.
        reason: String,
    },

    /// Addresses, MTU or link state could not be applied.
    #[error("cannot configure TUN device '{name}': {reason}")]
    DeviceSetup {
        /// Interface name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A packet transfer on a running interface failed.
    #[error("TUN {op} failed: {source}")]
    DeviceIo {
        /// Transfer direction.
        op: DeviceOp,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// A setting or address string was rejected.
    #[error("invalid {field} '{value}': {reason}")]
    Invalid {
        /// What was being parsed or checked.
        field: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A local system call failed outside any transfer.
    #[error("{context}: {source}")]
    Io {
        /// The call that failed.
        context: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Creates an `Invalid` error.
    pub fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Resolve` error.
    pub fn resolve(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceCreate` error.
    pub fn device_create(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceCreate {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceSetup` error.
    pub fn device_setup(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceSetup {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns a mapper wrapping an OS error in `Io` under `context`.
    pub fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }

    /// Creates a `DeviceIo` error.
    #[must_use]
    pub const fn device_io(op: DeviceOp, source: io::Error) -> Self {
        Self::DeviceIo { op, source }
    }

    /// Returns the handle this error belongs to.
    #[must_use]
    pub const fn edge(&self) -> Edge {
        match self {
            Self::Bind { .. }
            | Self::Resolve { .. }
            | Self::Send { .. }
            | Self::Recv(_)
            | Self::Closed => Edge::Socket,
            Self::DeviceCreate { .. } | Self::DeviceSetup { .. } | Self::DeviceIo { .. } => {
                Edge::Device
            }
            Self::Invalid { .. } | Self::Io { .. } => Edge::Settings,
        }
    }

    /// Returns `true` if only the current datagram is lost.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Send { .. } | Self::Recv(_))
    }

    /// Returns `true` for any TUN device failure.
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(self.edge(), Edge::Device)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn os_error() -> io::Error {
        io::Error::from(io::ErrorKind::ConnectionRefused)
    }

    #[test]
    fn test_socket_transfer_errors_are_recoverable() {
        let send = TransportError::Send {
            dest: "127.0.0.1:1414".parse().unwrap(),
            source: os_error(),
        };
        assert_eq!(send.edge(), Edge::Socket);
        assert!(send.is_recoverable());
        assert!(!send.is_device_error());
        assert!(send.to_string().contains("127.0.0.1:1414"));

        assert!(TransportError::Recv(os_error()).is_recoverable());
    }

    #[test]
    fn test_socket_setup_errors_are_not_recoverable() {
        let bind = TransportError::Bind {
            addr: "0.0.0.0:1414".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.edge(), Edge::Socket);
        assert!(!bind.is_recoverable());

        let resolve = TransportError::resolve("vpn.example:1414", "no records");
        assert!(!resolve.is_recoverable());
        assert!(resolve.to_string().contains("vpn.example:1414"));

        assert!(!TransportError::Closed.is_recoverable());
    }

    #[test]
    fn test_device_errors() {
        let read = TransportError::device_io(DeviceOp::Read, os_error());
        assert!(read.is_device_error());
        assert!(!read.is_recoverable());
        assert!(read.to_string().starts_with("TUN read failed"));

        let create = TransportError::device_create("p2p%d", "permission denied");
        assert_eq!(create.edge(), Edge::Device);
        assert!(TransportError::device_setup("p2p0", "ip failed").is_device_error());
    }

    #[test]
    fn test_settings_errors() {
        let err = TransportError::invalid("mtu", "40", "out of range");
        assert_eq!(err.edge(), Edge::Settings);
        assert!(!err.is_recoverable());
        assert!(!err.is_device_error());
        assert_eq!(err.to_string(), "invalid mtu '40': out of range");

        let err = TransportError::io("setting non-blocking")(os_error());
        assert_eq!(err.edge(), Edge::Settings);
        assert!(err.to_string().starts_with("setting non-blocking"));
    }
}
