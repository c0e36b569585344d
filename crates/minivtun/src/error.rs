// ============================================
// File: crates/minivtun/src/error.rs
// ============================================
//! # Tunnel Error Types
//!
//! ## Main Functionality
//! - `TunnelError`: configuration, startup and wrapped lower-layer errors
//! - `is_fatal`: decides whether the relay loop must stop
//! - `exit_code`: process status, distinguishing configuration mistakes
//!
//! ## ⚠️ Important Note for Next Developer
//! - Per-datagram errors (format, auth, capacity, socket) never
//!   terminate the tunnel; only device and startup errors do
//!
//! ## Last Modified
//! v0.1.0 - Initial tunnel errors

use thiserror::Error;

use minivtun_core::error::CoreError;
use minivtun_transport::error::TransportError;

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Tunnel error types.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// File path.
        path: String,
        /// Why loading failed.
        reason: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field name.
        field: String,
        /// Why it's invalid.
        reason: String,
    },

    /// A required configuration value is missing.
    #[error("Missing required configuration: {field}")]
    ConfigMissing {
        /// Dotted field name.
        field: String,
    },

    /// The tunnel could not be brought up.
    #[error("Tunnel failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed.
        reason: String,
    },

    /// Protocol or crypto error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Socket or device error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigMissing` error.
    pub fn config_missing(field: impl Into<String>) -> Self {
        Self::ConfigMissing {
            field: field.into(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::ConfigMissing { .. }
        )
    }

    /// Returns `true` if the tunnel cannot continue after this error.
    ///
    /// Socket send/receive failures lose one datagram; every other
    /// socket or device failure ends the relay loop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigLoad { .. }
            | Self::ConfigInvalid { .. }
            | Self::ConfigMissing { .. }
            | Self::StartupFailed { .. } => true,
            Self::Transport(e) => !e.is_recoverable(),
            Self::Core(_) | Self::Io(_) => false,
        }
    }

    /// Process exit status for this error: 2 for configuration
    /// problems, 1 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_config_error() {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use minivtun_transport::error::DeviceOp;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = TunnelError::config_load("/etc/minivtun.toml", "file not found");
        assert!(err.to_string().contains("/etc/minivtun.toml"));
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err = TunnelError::config_invalid("timers.keepalive_secs", "must be > 0");
        assert!(err.is_config_error());
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
        assert!(TunnelError::config_missing("network").is_fatal());
    }

    #[test]
    fn test_runtime_errors_exit_with_one() {
        let err = TunnelError::startup_failed("no TUN support");
        assert!(!err.is_config_error());
        assert_eq!(err.exit_code(), 1);

        let err: TunnelError = TransportError::device_create("p2p%d", "EPERM").into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_device_errors_are_fatal() {
        let err: TunnelError =
            TransportError::device_io(DeviceOp::Write, io::Error::from(io::ErrorKind::Other))
                .into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_closed_socket_is_fatal() {
        let err: TunnelError = TransportError::Closed.into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_packet_errors_are_not_fatal() {
        let err: TunnelError = CoreError::AuthenticationFailed.into();
        assert!(!err.is_fatal());

        let err: TunnelError =
            TransportError::Recv(io::Error::from(io::ErrorKind::ConnectionRefused)).into();
        assert!(!err.is_fatal());
    }
}
