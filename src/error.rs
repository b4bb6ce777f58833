//! Error types for Shroud
//!
//! This module defines the typed errors raised by the tunnel and the facade.
//! Operational paths wrap these in `anyhow` with context, the same way the
//! rest of the crate reports failures.

use std::io;
use thiserror::Error;

/// Main error type for Shroud operations
#[derive(Error, Debug)]
pub enum ShroudError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Proxy URI uses a scheme other than socks, socks4, socks4a, socks5, socks5h
    #[error("Invalid proxy scheme: {0}")]
    InvalidScheme(String),

    /// Proxy URI could not be parsed or has no host
    #[error("Invalid proxy URI: {0}")]
    InvalidProxyUri(String),

    /// Malformed tunnel handshake frame
    #[error("Handshake decode error: {0}")]
    HandshakeDecode(String),

    /// Outbound connect, SOCKS or TLS failure
    #[error("Dial error: {0}")]
    Dial(String),

    /// Destination host could not be resolved
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// Placeholder credential missing from the authorization mapping
    #[error("Unauthorized credential")]
    Unauthorized,

    /// Upstream answered 429
    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    /// WebSocket upgrade or session failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}
