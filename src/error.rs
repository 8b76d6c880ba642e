//! Error types for trace operations.

use std::io;
use thiserror::Error;

/// Everything that can go wrong while resolving, probing or decoding.
#[derive(Error, Debug)]
pub enum TraceError {
    // Resolution errors
    #[error("Failed to resolve {host}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No IPv4 address found for {host}")]
    NoIpv4Address { host: String },

    // Socket errors
    #[error(
        "Failed to open raw ICMP socket. Raw sockets require elevated privilege (run with sudo or grant CAP_NET_RAW)"
    )]
    Privilege(#[source] io::Error),

    #[error("Failed to set TTL to {ttl}")]
    SetTtl {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send probe with TTL {ttl}")]
    Send {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set receive deadline")]
    SetTimeout(#[source] io::Error),

    #[error("Failed to receive")]
    Receive(#[source] io::Error),

    // Packet errors
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet does not answer our probe")]
    NonMatchingPacket,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TraceError {
    /// Returns true if the probe loop should keep reading after this error.
    ///
    /// A raw ICMP socket sees every ICMP packet the host receives, so
    /// garbage and other processes' replies are expected and never end a probe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MalformedPacket(_) | Self::NonMatchingPacket)
    }

    /// Returns true if the destination could not be turned into an IPv4 address.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. } | Self::NoIpv4Address { .. })
    }
}

/// Result type alias for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;
