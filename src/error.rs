//! Error types for scan streaming.
//!
//! Errors fall into two groups with very different handling:
//!
//! - **Setup errors** ([`TransportError`]): opening sockets, binding, joining a
//!   multicast group, spawning the receive thread. These are returned to the
//!   caller from `init`/`start_listen` and friends.
//! - **Data-loss reasons** ([`DropReason`]): a datagram or fragment that could
//!   not be used. These never interrupt the receive loop; they are counted and
//!   logged, and each costs at most one frame.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use rangecast::TransportError;
//!
//! let error = TransportError::NotInitialized;
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// Setup and lifecycle failures of the UDP transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Failed to create UDP socket")]
    SocketCreateFailed {
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket option {option}")]
    OptionSetFailed {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind {addr}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Address {addr} is already in use")]
    AddressInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to join multicast group {group} on interface {interface}")]
    MulticastJoinFailed {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("Socket is not initialized")]
    NotInitialized,

    #[error("Failed to spawn thread '{name}'")]
    ThreadSpawnFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build receive runtime")]
    RuntimeBuildFailed {
        #[source]
        source: io::Error,
    },

    #[error("Invalid channel '{input}': {reason}")]
    InvalidChannel { input: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl TransportError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::SocketCreateFailed { .. } => true,
            TransportError::AddressInUse { .. } => true,
            TransportError::ThreadSpawnFailed { .. } => true,
            TransportError::RuntimeBuildFailed { .. } => true,
            TransportError::OptionSetFailed { .. } => false,
            TransportError::BindFailed { .. } => false,
            TransportError::MulticastJoinFailed { .. } => false,
            TransportError::NotInitialized => false,
            TransportError::InvalidChannel { .. } => false,
            TransportError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TransportError::SocketCreateFailed { .. } => vec![
                "Check the process file descriptor limit",
                "Verify IPv4 networking is available",
            ],
            TransportError::OptionSetFailed { .. } => vec![
                "Check the socket option is supported on this platform",
                "Use a TTL of 0 for unicast publishing",
            ],
            TransportError::BindFailed { .. } => vec![
                "Check the port number is valid",
                "Ports below 1024 require elevated privileges",
            ],
            TransportError::AddressInUse { .. } => vec![
                "Stop the other process bound to this port",
                "Enable port reuse when several consumers share a port",
            ],
            TransportError::MulticastJoinFailed { .. } => vec![
                "Verify the group address is in 224.0.0.0/4",
                "Check the interface address belongs to this host",
                "Check a multicast route exists for the interface",
            ],
            TransportError::NotInitialized => {
                vec!["Create a new sender or receiver; closed sockets cannot be reopened"]
            }
            TransportError::ThreadSpawnFailed { .. }
            | TransportError::RuntimeBuildFailed { .. } => {
                vec!["Check the process thread limit", "Check available memory"]
            }
            TransportError::InvalidChannel { .. } => {
                vec!["Use the form a.b.c.d:port with an IPv4 address"]
            }
            TransportError::Config { .. } => vec!["Check the configuration values"],
        }
    }

    /// Classify a bind failure: `EADDRINUSE` becomes [`TransportError::AddressInUse`].
    pub fn from_bind_error(addr: SocketAddr, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            TransportError::AddressInUse { addr, source }
        } else {
            TransportError::BindFailed { addr, source }
        }
    }

    /// Helper constructor for socket option failures.
    pub fn option_failed(option: &'static str, source: io::Error) -> Self {
        TransportError::OptionSetFailed { option, source }
    }

    /// Helper constructor for channel parse failures.
    pub fn invalid_channel(input: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::InvalidChannel { input: input.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        TransportError::Config { reason: reason.into() }
    }
}

/// Why a received datagram or fragment did not contribute to a delivered frame.
///
/// None of these are fatal: the receive loop keeps running and the loss is
/// scoped to a single frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Datagram length did not match the fragment wire size, or its
    /// sub-sequence was out of range.
    #[error("incomplete packet received ({len} bytes)")]
    MalformedPacket { len: usize },

    /// Fragment arrived out of order; the rest of its frame is discarded.
    #[error("sequence gap at {seq}|{subseq}, expected {expected_seq}|{expected_subseq}")]
    SequenceGap { seq: u32, subseq: u32, expected_seq: u32, expected_subseq: u32 },

    /// The current write slot still holds an unread frame.
    #[error("buffer full, dropping frame {seq}")]
    BufferFull { seq: u32 },

    /// A continuation fragment arrived but no frame write is open.
    #[error("bogus write entry for {seq}|{subseq}")]
    BogusWrite { seq: u32, subseq: u32 },
}

/// Failure reported by a [`crate::publisher::ScanSource`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SourceError {
    #[error("Scan source is disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Failed to grab scan data: {reason}")]
    Grab { reason: String },

    #[error("Scan source returned {count} nodes, more than a frame holds")]
    TooManyNodes { count: usize },

    #[error("Scan source I/O error")]
    Io(#[from] io::Error),
}

/// Failure of one publish step.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PublishError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PublishError {
    /// Returns whether the publish loop should keep going after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Source(SourceError::Disconnected { .. }) => false,
            PublishError::Source(_) => true,
            PublishError::Transport(e) => e.is_retryable(),
        }
    }
}
