//! Gateway frame inspection
//!
//! Data frames are decoded as JSON and classified by their `op`/`t` fields.
//! Only READY dispatches (upstream to client) and identify/resume payloads
//! (client to upstream) are touched. Everything else, including frames that
//! are not JSON at all, is passed on as the original message.

use super::auth::AuthorizationMapping;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Dispatch opcode
pub const OP_DISPATCH: u64 = 0;
/// Identify opcode
pub const OP_IDENTIFY: u64 = 2;
/// Resume opcode
pub const OP_RESUME: u64 = 6;

/// Close code sent when identify/resume carries an unknown token
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;
/// Close reason paired with [`CLOSE_AUTHENTICATION_FAILED`]
pub const CLOSE_AUTHENTICATION_FAILED_REASON: &str = "Authentication failed.";

/// Outcome of inspecting a client frame
#[derive(Debug, PartialEq)]
pub enum ClientVerdict {
    /// Send this message upstream
    Forward(Message),
    /// Credential not mapped; close the session
    Reject,
}

#[derive(Debug, PartialEq)]
enum GatewayFrame {
    Ready,
    Authenticate,
    Other,
}

fn classify(payload: &Value) -> GatewayFrame {
    match payload.get("op").and_then(Value::as_u64) {
        Some(OP_DISPATCH) if payload.get("t").and_then(Value::as_str) == Some("READY") => {
            GatewayFrame::Ready
        }
        Some(OP_IDENTIFY) | Some(OP_RESUME) => GatewayFrame::Authenticate,
        _ => GatewayFrame::Other,
    }
}

/// JSON payload of a data message, if it has one
fn decode(msg: &Message) -> Option<Value> {
    match msg {
        Message::Text(text) => serde_json::from_str(text).ok(),
        Message::Binary(data) => serde_json::from_slice(data).ok(),
        _ => None,
    }
}

/// Re-encode `payload` with the framing of `original`
fn encode_like(original: &Message, payload: &Value) -> Option<Message> {
    match original {
        Message::Text(_) => serde_json::to_string(payload).ok().map(Message::Text),
        Message::Binary(_) => serde_json::to_vec(payload).ok().map(Message::Binary),
        _ => None,
    }
}

/// Rewrite a frame travelling upstream to client
///
/// READY dispatches get `d.resume_gateway_url` pointed at `public_ws_url`.
pub fn rewrite_upstream(msg: Message, public_ws_url: &str) -> Message {
    let Some(mut payload) = decode(&msg) else {
        return msg;
    };

    if classify(&payload) != GatewayFrame::Ready {
        return msg;
    }

    match payload.get_mut("d").and_then(Value::as_object_mut) {
        Some(d) => {
            d.insert(
                "resume_gateway_url".to_string(),
                Value::String(public_ws_url.to_string()),
            );
        }
        None => return msg,
    }

    encode_like(&msg, &payload).unwrap_or(msg)
}

/// Inspect a frame travelling client to upstream
///
/// Identify and resume payloads have `d.token` swapped for the real
/// credential. A missing or unmapped token rejects the frame.
pub fn inspect_client(msg: Message, auth: &AuthorizationMapping) -> ClientVerdict {
    let Some(mut payload) = decode(&msg) else {
        return ClientVerdict::Forward(msg);
    };

    if classify(&payload) != GatewayFrame::Authenticate {
        return ClientVerdict::Forward(msg);
    }

    let real = payload
        .get("d")
        .and_then(|d| d.get("token"))
        .and_then(Value::as_str)
        .and_then(|token| auth.get(token))
        .map(str::to_string);

    let (Some(real), Some(d)) = (real, payload.get_mut("d").and_then(Value::as_object_mut)) else {
        return ClientVerdict::Reject;
    };
    d.insert("token".to_string(), Value::String(real));

    match encode_like(&msg, &payload) {
        Some(rewritten) => ClientVerdict::Forward(rewritten),
        None => ClientVerdict::Reject,
    }
}
