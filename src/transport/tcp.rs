//! Direct TCP dialing
//!
//! Plain TCP connections with a connect timeout, used both for direct relay
//! dials and for reaching the relay or a SOCKS proxy.

use super::{Destination, Dialer, SocketOpts, StreamDyn};
use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect to `host:port` within `timeout` and apply `opts`
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
    opts: &SocketOpts,
) -> Result<TcpStream> {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .with_context(|| format!("Connection timeout to {}", Destination::new(host, port)))?
        .with_context(|| format!("Failed to connect to {}", Destination::new(host, port)))?;

    opts.apply(&stream)?;

    Ok(stream)
}

/// Dialer that connects straight to the destination
#[derive(Debug, Clone)]
pub struct DirectDialer {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl Default for DirectDialer {
    fn default() -> Self {
        DirectDialer {
            socket_opts: SocketOpts::for_destination(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl DirectDialer {
    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, dest: &Destination) -> Result<Box<dyn StreamDyn>> {
        let stream = connect_tcp(&dest.host, dest.port, self.connect_timeout, &self.socket_opts).await?;

        tracing::debug!("TCP connection established to {}", dest);

        Ok(Box::new(stream))
    }
}
