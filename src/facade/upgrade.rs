//! Server side of the WebSocket upgrade on the facade listener
//!
//! hyper owns the HTTP/1.1 connection, so the upgrade is answered here with
//! a `101 Switching Protocols` and the raw upgraded IO is then wrapped as a
//! server-role WebSocket.

use super::{empty_body, FacadeBody};
use crate::error::ShroudError;
use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

/// WebSocket connection accepted from a facade client
pub type ClientSocket = WebSocketStream<TokioIo<Upgraded>>;

fn header_contains_token(headers: &HeaderMap, name: hyper::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Whether `req` asks for a WebSocket upgrade
pub fn is_websocket_upgrade<B>(req: &Request<B>) -> bool {
    let headers = req.headers();
    header_contains_token(headers, CONNECTION, "upgrade")
        && header_contains_token(headers, UPGRADE, "websocket")
        && headers.contains_key(SEC_WEBSOCKET_KEY)
}

/// Answer the upgrade request
///
/// Returns the `101` response to hand back to hyper and the pending upgrade,
/// which resolves once hyper has flushed that response.
pub fn accept<B>(req: &mut Request<B>) -> Result<(Response<FacadeBody>, OnUpgrade), ShroudError> {
    let key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .ok_or_else(|| ShroudError::WebSocket("Missing Sec-WebSocket-Key".to_string()))?;

    if let Some(version) = req.headers().get(SEC_WEBSOCKET_VERSION) {
        if version.as_bytes() != b"13" {
            return Err(ShroudError::WebSocket(format!(
                "Unsupported WebSocket version: {:?}",
                version
            )));
        }
    }

    let accept_key = derive_accept_key(key.as_bytes());

    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(
        SEC_WEBSOCKET_ACCEPT,
        HeaderValue::from_str(&accept_key)
            .map_err(|e| ShroudError::WebSocket(format!("Invalid accept key: {}", e)))?,
    );

    Ok((response, hyper::upgrade::on(req)))
}

/// Wrap the upgraded connection as a server-role WebSocket
pub async fn into_client_socket(upgraded: Upgraded) -> ClientSocket {
    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await
}
