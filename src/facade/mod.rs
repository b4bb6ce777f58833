//! Facade relay
//!
//! An HTTP listener that looks like the real API to its clients. Requests
//! carrying a WebSocket upgrade on `/` become gateway sessions; everything
//! else is forwarded as REST. Both legs reach the real service only through
//! the injected [`TunnelConnector`] and swap placeholder credentials from the
//! shared [`AuthorizationMapping`] for the real ones.

mod auth;
mod frames;
mod gateway;
mod rest;
mod upgrade;

pub use auth::AuthorizationMapping;
pub use frames::{
    inspect_client, rewrite_upstream, ClientVerdict, CLOSE_AUTHENTICATION_FAILED,
    CLOSE_AUTHENTICATION_FAILED_REASON, OP_DISPATCH, OP_IDENTIFY, OP_RESUME,
};
pub use gateway::{upstream_gateway_url, UPSTREAM_UNAVAILABLE_REASON};
pub use rest::{error_response, is_gateway_info_path, rewrite_gateway_info};
pub use upgrade::is_websocket_upgrade;

use crate::config::FacadeConfig;
use crate::tunnel::TunnelConnector;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Body type of every facade response
pub type FacadeBody = BoxBody<Bytes, hyper::Error>;

pub(crate) fn empty_body() -> FacadeBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn full_body(chunk: impl Into<Bytes>) -> FacadeBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// State shared by every request on every facade listener
pub struct FacadeState {
    /// Real REST base, without trailing slash
    api_base: String,
    /// Real gateway base, without trailing slash
    gateway_base: String,
    /// Gateway address advertised to clients
    public_ws_url: String,
    authorizations: AuthorizationMapping,
    /// Per-request connector for upstream gateway sockets
    connector: TunnelConnector,
    /// Pooled REST client over the same connector
    client: Client<TunnelConnector, Incoming>,
}

impl FacadeState {
    /// Build the shared state around `connector`
    pub fn new(config: &FacadeConfig, connector: TunnelConnector) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(connector.clone());

        FacadeState {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            gateway_base: config.gateway_base.trim_end_matches('/').to_string(),
            public_ws_url: config.public_ws_url(),
            authorizations: config.authorizations.clone(),
            connector,
            client,
        }
    }
}

impl std::fmt::Debug for FacadeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacadeState")
            .field("api_base", &self.api_base)
            .field("gateway_base", &self.gateway_base)
            .field("public_ws_url", &self.public_ws_url)
            .field("authorizations", &self.authorizations)
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

/// Route one request to the gateway or REST leg
async fn handle_request(
    state: Arc<FacadeState>,
    req: Request<Incoming>,
) -> Result<Response<FacadeBody>, Infallible> {
    if req.uri().path() == "/" && is_websocket_upgrade(&req) {
        return Ok(gateway::upgrade(state, req));
    }
    Ok(rest::forward(&state, req).await)
}

/// Facade server bound to one or more listeners
pub struct FacadeServer {
    listeners: Vec<TcpListener>,
    state: Arc<FacadeState>,
}

impl FacadeServer {
    /// Bind every configured listener
    pub async fn bind(config: &FacadeConfig, connector: TunnelConnector) -> Result<Self> {
        let mut listeners = Vec::with_capacity(config.listeners.len());
        for addr in &config.listeners {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind facade listener {}", addr))?;
            listeners.push(listener);
        }

        info!(
            "Facade forwarding to {} and {} with {} mapped credentials",
            config.api_base,
            config.gateway_base,
            config.authorizations.len()
        );

        Ok(FacadeServer {
            listeners,
            state: Arc::new(FacadeState::new(config, connector)),
        })
    }

    /// Addresses the listeners are bound to
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let mut accept_loops = JoinSet::new();

        for listener in self.listeners {
            match listener.local_addr() {
                Ok(addr) => info!("Facade listening on {}", addr),
                Err(e) => warn!("Facade listener address unavailable: {}", e),
            }
            accept_loops.spawn(accept_loop(listener, self.state.clone()));
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping facade");
            }
            Some(result) = accept_loops.join_next() => {
                if let Err(e) = result {
                    error!("Facade accept loop ended unexpectedly: {}", e);
                }
            }
        }

        accept_loops.abort_all();
        info!("Facade stopped");
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<FacadeState>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept facade connection: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(state.clone(), req));

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                debug!("Facade connection from {} ended: {}", peer, e);
            }
        });
    }
}
