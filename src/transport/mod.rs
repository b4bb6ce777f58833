//! Transport module for Shroud
//!
//! This module provides the socket plumbing shared by the relay and the
//! connector: socket options, the [`Dialer`] abstraction used by the relay
//! to reach tunnel destinations, TLS client setup and DNS lookup.

pub mod dns;
mod tcp;
mod tls;

pub use tcp::{connect_tcp, DirectDialer};
pub use tls::{server_name_for, TlsClient, TlsStream};

use crate::config::TcpConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Options for sockets dialed to tunnel destinations (no-delay only)
    pub fn for_destination() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: None,
            keepalive_interval: None,
        }
    }

    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Logical destination of a tunnel connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Host name or literal address
    pub host: String,
    /// Port
    pub port: u16,
}

impl Destination {
    /// Create a new destination
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Destination {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Strategy the relay uses to open the real outbound connection
///
/// Implementations exist for direct TCP ([`DirectDialer`]) and for a SOCKS
/// hop ([`crate::socks::SocksDialer`]).
#[async_trait]
pub trait Dialer: Debug + Send + Sync + 'static {
    /// Open a connection to `dest`
    async fn dial(&self, dest: &Destination) -> Result<Box<dyn StreamDyn>>;
}

/// Dynamic stream trait for boxed streams
pub trait StreamDyn: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug> StreamDyn for T {}
