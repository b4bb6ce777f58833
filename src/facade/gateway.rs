//! WebSocket leg of the facade
//!
//! Each accepted client socket owns exactly one upstream gateway socket,
//! opened through the tunnel connector. Frames are relayed in both
//! directions until one side closes; the close is mirrored to the other side
//! with the same code and reason.

use super::frames::{
    inspect_client, rewrite_upstream, ClientVerdict, CLOSE_AUTHENTICATION_FAILED,
    CLOSE_AUTHENTICATION_FAILED_REASON,
};
use super::upgrade::{accept, into_client_socket};
use super::{empty_body, FacadeBody, FacadeState};
use crate::error::ShroudError;
use crate::tunnel::TunnelStream;
use futures::{SinkExt, StreamExt};
use hyper::{Request, Response, StatusCode, Uri};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Close reason sent to the client when the upstream gateway cannot be opened
pub const UPSTREAM_UNAVAILABLE_REASON: &str = "upstream unavailable";

fn close_message(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

/// Upstream gateway URL for the inbound path and query
pub fn upstream_gateway_url(gateway_base: &str, inbound: &Uri) -> String {
    let suffix = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .trim_start_matches('/');
    format!("{}/{}", gateway_base, suffix)
}

/// Accept a gateway upgrade and spawn its session
pub fn upgrade<B>(state: Arc<FacadeState>, mut req: Request<B>) -> Response<FacadeBody> {
    let url = upstream_gateway_url(&state.gateway_base, req.uri());

    let (response, on_upgrade) = match accept(&mut req) {
        Ok(accepted) => accepted,
        Err(e) => {
            debug!("Rejected gateway upgrade: {}", e);
            let mut response = Response::new(empty_body());
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!("Gateway upgrade failed: {}", e);
                return;
            }
        };

        let client = into_client_socket(upgraded).await;
        run_session(&state, client, &url).await;
    });

    response
}

/// Open the upstream gateway socket through the tunnel
async fn open_upstream(
    state: &FacadeState,
    url: &str,
) -> Result<WebSocketStream<TunnelStream>, ShroudError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| ShroudError::WebSocket(format!("Invalid gateway URL {}: {}", url, e)))?;

    let stream = state.connector.connect_uri(&uri).await?;

    let (socket, _) = tokio_tungstenite::client_async(url, stream)
        .await
        .map_err(|e| ShroudError::WebSocket(format!("Gateway handshake with {} failed: {}", url, e)))?;

    Ok(socket)
}

async fn run_session<C>(state: &FacadeState, mut client: WebSocketStream<C>, url: &str)
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let upstream = match open_upstream(state, url).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("{}", e);
            let _ = client
                .send(close_message(CloseCode::Error, UPSTREAM_UNAVAILABLE_REASON))
                .await;
            let _ = client.close(None).await;
            return;
        }
    };

    info!("Gateway session opened to {}", url);
    relay_session(client, upstream, state).await;
    info!("Gateway session to {} closed", url);
}

/// Relay frames between a client socket and its upstream socket
async fn relay_session<C, U>(
    client: WebSocketStream<C>,
    upstream: WebSocketStream<U>,
    state: &FacadeState,
) where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    loop {
        tokio::select! {
            msg = upstream_rx.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!("Upstream closed: {:?}", frame);
                    let _ = client_tx.send(Message::Close(frame)).await;
                    break;
                }
                // Control frames are answered by each socket on its own
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(msg)) => {
                    let msg = rewrite_upstream(msg, &state.public_ws_url);
                    if let Err(e) = client_tx.send(msg).await {
                        debug!("Client write failed: {}", e);
                        let _ = upstream_tx.send(close_message(CloseCode::Error, "")).await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!("Upstream read failed: {}", e);
                    let _ = client_tx.send(close_message(CloseCode::Error, "")).await;
                    break;
                }
                None => {
                    let _ = client_tx.send(close_message(CloseCode::Error, "")).await;
                    break;
                }
            },
            msg = client_rx.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!("Client closed: {:?}", frame);
                    let _ = upstream_tx.send(Message::Close(frame)).await;
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(msg)) => match inspect_client(msg, &state.authorizations) {
                    ClientVerdict::Forward(msg) => {
                        if let Err(e) = upstream_tx.send(msg).await {
                            debug!("Upstream write failed: {}", e);
                            let _ = client_tx.send(close_message(CloseCode::Error, "")).await;
                            break;
                        }
                    }
                    ClientVerdict::Reject => {
                        warn!("Gateway session rejected: {}", ShroudError::Unauthorized);
                        let code = CloseCode::from(CLOSE_AUTHENTICATION_FAILED);
                        let _ = client_tx
                            .send(close_message(code, CLOSE_AUTHENTICATION_FAILED_REASON))
                            .await;
                        let _ = upstream_tx
                            .send(close_message(code, CLOSE_AUTHENTICATION_FAILED_REASON))
                            .await;
                        break;
                    }
                },
                Some(Err(e)) => {
                    debug!("Client read failed: {}", e);
                    let _ = upstream_tx.send(close_message(CloseCode::Error, "")).await;
                    break;
                }
                None => {
                    let _ = upstream_tx.send(close_message(CloseCode::Error, "")).await;
                    break;
                }
            },
        }
    }

    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;
}
