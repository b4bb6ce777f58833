//! Tunnel client connector
//!
//! Every outbound connection first dials the relay, announces its logical
//! destination with a handshake frame and then either uses the raw socket
//! (plain) or runs TLS for the destination over it.
//!
//! Two call shapes share that sequence: [`TunnelConnector::connect`] hands
//! out one stream per request, and the [`Service<Uri>`] impl lets
//! `hyper_util`'s pooling client open and reuse connections.

use super::stream::{TunnelIo, TunnelStream};
use crate::config::ConnectorConfig;
use crate::error::ShroudError;
use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::protocol::{write_handshake, HandshakeFrame};
use crate::transport::{SocketOpts, TlsClient};
use anyhow::Result;
use hyper::Uri;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tower_service::Service;
use tracing::{debug, warn};

/// Outbound connection strategy routing through the tunnel relay
#[derive(Debug, Clone)]
pub struct TunnelConnector {
    /// Relay server address
    relay_addr: Arc<str>,
    /// Socket options for the relay socket
    socket_opts: SocketOpts,
    /// TLS client for secure destinations
    tls: TlsClient,
    /// Timeout for reaching the relay
    connect_timeout: Duration,
}

impl TunnelConnector {
    /// Create a connector for the relay at `relay_addr`
    pub fn new(relay_addr: impl Into<String>) -> Self {
        TunnelConnector {
            relay_addr: Arc::from(relay_addr.into()),
            socket_opts: SocketOpts::default(),
            tls: TlsClient::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Create a connector from configuration
    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        Ok(TunnelConnector::new(config.relay_addr.clone())
            .with_socket_opts(SocketOpts::from_tcp_config(&config.tcp))
            .with_tls(TlsClient::from_config(&config.tls)?))
    }

    /// Set the TLS client
    pub fn with_tls(mut self, tls: TlsClient) -> Self {
        self.tls = tls;
        self
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set the timeout for reaching the relay
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Relay server address
    pub fn relay_addr(&self) -> &str {
        &self.relay_addr
    }

    /// Open a connection to `host:port` through the relay
    ///
    /// With `tls` set, the returned stream is a TLS session with `host`.
    pub async fn connect(&self, host: &str, port: u16, tls: bool) -> Result<TunnelStream, ShroudError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&*self.relay_addr))
            .await
            .map_err(|_| ShroudError::Dial(format!("Connection timeout to relay {}", self.relay_addr)))?
            .map_err(|e| ShroudError::Dial(format!("Relay {} unreachable: {}", self.relay_addr, e)))?;

        self.socket_opts.apply(&stream)?;

        write_handshake(&mut stream, &HandshakeFrame::new(host, port))
            .await
            .map_err(|e| ShroudError::Dial(format!("Failed to send handshake for {}:{}: {}", host, port, e)))?;

        debug!("Tunnel to {}:{} opened via {} (tls: {})", host, port, self.relay_addr, tls);

        if !tls {
            return Ok(TunnelStream::Plain(stream));
        }

        // The relay socket is moved into the handshake; on failure both are dropped together
        match self.tls.handshake(stream, host).await {
            Ok(tls_stream) => Ok(TunnelStream::Tls(Box::new(tls_stream))),
            Err(e) => {
                warn!("TLS through tunnel to {}:{} failed: {:#}", host, port, e);
                Err(ShroudError::Dial(format!("{:#}", e)))
            }
        }
    }

    /// Open a connection for `uri`
    ///
    /// `https` and `wss` select TLS. Without an explicit port the scheme's
    /// default (443 or 80) is announced to the relay.
    pub async fn connect_uri(&self, uri: &Uri) -> Result<TunnelStream, ShroudError> {
        let (host, port, tls) = destination_of(uri)?;
        self.connect(&host, port, tls).await
    }
}

/// Host, logical port and TLS flag for `uri`
pub fn destination_of(uri: &Uri) -> Result<(String, u16, bool), ShroudError> {
    let host = uri
        .host()
        .ok_or_else(|| ShroudError::Dial(format!("Missing host in URI: {}", uri)))?;

    let tls = matches!(uri.scheme_str(), Some("https") | Some("wss"));
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    Ok((host.trim_start_matches('[').trim_end_matches(']').to_string(), port, tls))
}

impl Service<Uri> for TunnelConnector {
    type Response = TunnelIo;
    type Error = ShroudError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Stateless connector - always ready
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connector = self.clone();

        Box::pin(async move {
            let stream = connector.connect_uri(&uri).await?;
            Ok(TunnelIo::new(stream))
        })
    }
}
