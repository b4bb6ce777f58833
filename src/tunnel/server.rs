//! Tunnel relay server
//!
//! Accepts tunnel connections, reads the handshake frame, dials the announced
//! destination (directly or through a SOCKS proxy) and pipes bytes until
//! either side closes.

use crate::config::RelayConfig;
use crate::error::ShroudError;
use crate::helper::{duration_from_secs, pipe_streams, DEFAULT_HANDSHAKE_TIMEOUT_SECS};
use crate::protocol::read_handshake;
use crate::socks::{ProxyDescriptor, SocksDialer};
use crate::transport::{Destination, Dialer, DirectDialer, SocketOpts};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Relay server bound to one or more listeners
pub struct RelayServer {
    listeners: Vec<TcpListener>,
    /// Strategy for the outbound leg
    dialer: Arc<dyn Dialer>,
    /// Options applied to accepted sockets
    socket_opts: SocketOpts,
    handshake_timeout: Duration,
}

impl RelayServer {
    /// Bind every configured listener
    ///
    /// An unsupported proxy scheme is a startup error.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let connect_timeout = duration_from_secs(config.connect_timeout);

        let dialer: Arc<dyn Dialer> = match &config.proxy {
            Some(uri) => {
                let descriptor = ProxyDescriptor::parse(uri)?;
                info!("Outbound connections chained through {}", descriptor);
                Arc::new(SocksDialer::new(descriptor).with_connect_timeout(connect_timeout))
            }
            None => Arc::new(DirectDialer::default().with_connect_timeout(connect_timeout)),
        };

        RelayServer::bind_with_dialer(
            &config.listeners,
            dialer,
            SocketOpts::from_tcp_config(&config.tcp),
        )
        .await
    }

    /// Bind `addrs` with an explicit outbound dialer
    pub async fn bind_with_dialer(
        addrs: &[String],
        dialer: Arc<dyn Dialer>,
        socket_opts: SocketOpts,
    ) -> Result<Self> {
        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind relay listener {}", addr))?;
            listeners.push(listener);
        }

        Ok(RelayServer {
            listeners,
            dialer,
            socket_opts,
            handshake_timeout: duration_from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        })
    }

    /// Set how long a client may take to deliver its handshake
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Addresses the listeners are bound to
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve until shutdown
    ///
    /// Stops accepting on shutdown. Tunnels already established keep running
    /// until one of their sides closes.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let mut accept_loops = JoinSet::new();

        for listener in self.listeners {
            match listener.local_addr() {
                Ok(addr) => info!("Relay listening on {}", addr),
                Err(e) => warn!("Relay listener address unavailable: {}", e),
            }
            accept_loops.spawn(accept_loop(
                listener,
                self.dialer.clone(),
                self.socket_opts.clone(),
                self.handshake_timeout,
            ));
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping relay");
            }
            Some(result) = accept_loops.join_next() => {
                if let Err(e) = result {
                    error!("Relay accept loop ended unexpectedly: {}", e);
                }
            }
        }

        accept_loops.abort_all();
        info!("Relay stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    dialer: Arc<dyn Dialer>,
    socket_opts: SocketOpts,
    handshake_timeout: Duration,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept relay connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        if let Err(e) = socket_opts.apply(&stream) {
            warn!("Failed to apply socket options for {}: {}", peer, e);
        }

        let dialer = dialer.clone();
        tokio::spawn(async move {
            debug!("Tunnel connection from {}", peer);
            if let Err(e) = handle_connection(stream, dialer.as_ref(), handshake_timeout).await {
                warn!("Tunnel from {} closed: {}", peer, e);
            }
        });
    }
}

/// Serve a single tunnel connection
///
/// Bytes that arrived together with the handshake are delivered to the
/// destination before anything else.
pub async fn handle_connection<S>(
    mut inbound: S,
    dialer: &dyn Dialer,
    handshake_timeout: Duration,
) -> Result<(), ShroudError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (frame, trailing) = tokio::time::timeout(handshake_timeout, read_handshake(&mut inbound))
        .await
        .map_err(|_| ShroudError::HandshakeDecode("Timed out waiting for handshake".to_string()))??;

    let dest = Destination::new(frame.host, frame.port);

    let mut outbound = dialer
        .dial(&dest)
        .await
        .map_err(|e| ShroudError::Dial(format!("{}: {:#}", dest, e)))?;

    if !trailing.is_empty() {
        outbound.write_all(&trailing).await?;
    }

    debug!("Tunnel established to {} ({} early bytes)", dest, trailing.len());

    let (up, down) = pipe_streams(inbound, outbound).await;
    debug!("Tunnel to {} finished: {} bytes up, {} bytes down", dest, up, down);

    Ok(())
}
