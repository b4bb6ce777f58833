//! REST leg of the facade
//!
//! Requests are forwarded to the real API through the pooled tunnel client
//! after the placeholder credential in `Authorization` has been swapped for
//! the real one.

use super::{empty_body, full_body, FacadeBody, FacadeState};
use crate::error::ShroudError;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, HOST, LOCATION, RANGE, TRANSFER_ENCODING,
};
use hyper::{Request, Response, StatusCode, Uri};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Response headers never copied back to the client
const STRIPPED_RESPONSE_HEADERS: [hyper::header::HeaderName; 5] =
    [RANGE, TRANSFER_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, LOCATION];

/// Whether `path` asks for gateway connection info
///
/// Matches `/gateway`, `/gateway/bot`, `/v<N>/gateway` and `/v<N>/gateway/bot`.
pub fn is_gateway_info_path(path: &str) -> bool {
    let mut segments = path.trim_matches('/').split('/');
    let mut segment = segments.next();

    if let Some(version) = segment.and_then(|s| s.strip_prefix('v')) {
        if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) {
            segment = segments.next();
        }
    }

    if segment != Some("gateway") {
        return false;
    }

    matches!((segments.next(), segments.next()), (None, _) | (Some("bot"), None))
}

/// Point the `url` of a gateway info body at `public_ws_url`
///
/// Returns `None` when the body is not a JSON object.
pub fn rewrite_gateway_info(body: &[u8], public_ws_url: &str) -> Option<Bytes> {
    let mut info: Value = serde_json::from_slice(body).ok()?;
    info.as_object_mut()?
        .insert("url".to_string(), Value::String(public_ws_url.to_string()));
    serde_json::to_vec(&info).ok().map(Bytes::from)
}

/// JSON error body shared by the responses the facade generates itself
pub fn error_response(status: StatusCode) -> Response<FacadeBody> {
    let message = format!(
        "{}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    let body = json!({"error": {"message": message, "code": 0}}).to_string();

    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Swap the placeholder in `Authorization`, if the header is present
fn substitute_authorization(
    headers: &mut HeaderMap,
    state: &FacadeState,
) -> Result<(), ShroudError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(());
    };

    let real = value
        .to_str()
        .ok()
        .and_then(|v| state.authorizations.substitute_header(v))
        .ok_or(ShroudError::Unauthorized)?;

    let real = HeaderValue::from_str(&real).map_err(|_| ShroudError::Unauthorized)?;
    headers.insert(AUTHORIZATION, real);
    Ok(())
}

/// Upstream URI for an inbound path and query
fn upstream_uri(api_base: &str, inbound: &Uri) -> Result<Uri, ShroudError> {
    let path_and_query = inbound.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("{}/{}", api_base, path_and_query.trim_start_matches('/'));
    target
        .parse()
        .map_err(|e| ShroudError::Dial(format!("Invalid upstream URI {}: {}", target, e)))
}

/// Forward one REST request
pub async fn forward(state: &FacadeState, req: Request<Incoming>) -> Response<FacadeBody> {
    let (mut parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    parts.headers.remove(HOST);

    if let Err(e) = substitute_authorization(&mut parts.headers, state) {
        debug!("{} {} rejected: {}", parts.method, path, e);
        return error_response(StatusCode::UNAUTHORIZED);
    }

    let gateway_info = is_gateway_info_path(&path);
    if gateway_info {
        // The body is rewritten, so it must not come back compressed
        parts.headers.remove(ACCEPT_ENCODING);
    }

    parts.uri = match upstream_uri(&state.api_base, &parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            warn!("{}", e);
            return error_response(StatusCode::BAD_GATEWAY);
        }
    };

    debug!("Forwarding {} {} to {}", parts.method, path, parts.uri);

    let upstream = match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Upstream request for {} failed: {:#}", path, e);
            return error_response(StatusCode::BAD_GATEWAY);
        }
    };

    let (mut parts, body) = upstream.into_parts();
    for name in STRIPPED_RESPONSE_HEADERS {
        parts.headers.remove(name);
    }

    if parts.status == StatusCode::TOO_MANY_REQUESTS {
        warn!("{}", ShroudError::UpstreamRateLimited(path));
        return Response::from_parts(parts, empty_body());
    }

    if !(gateway_info && parts.status.is_success()) {
        return Response::from_parts(parts, body.boxed());
    }

    let raw = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read gateway info body for {}: {}", path, e);
            return error_response(StatusCode::BAD_GATEWAY);
        }
    };

    let body = match rewrite_gateway_info(&raw, &state.public_ws_url) {
        Some(rewritten) => rewritten,
        None => {
            warn!("Gateway info for {} is not a JSON object, passing it through", path);
            raw
        }
    };

    Response::from_parts(parts, full_body(body))
}
