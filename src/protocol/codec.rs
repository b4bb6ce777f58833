//! Handshake codec
//!
//! Encodes and decodes the length-prefixed handshake frame. Decoding keeps
//! whatever bytes followed the frame in the same read so the relay can hand
//! them to the destination before it starts piping.

use super::types::{HandshakeFrame, LENGTH_PREFIX_LEN, MAX_HANDSHAKE_LEN};
use crate::error::ShroudError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Encode a handshake frame: length prefix followed by the JSON payload
pub fn encode_handshake(frame: &HandshakeFrame) -> Result<Bytes, ShroudError> {
    let payload = serde_json::to_vec(frame)
        .map_err(|e| ShroudError::HandshakeDecode(format!("Failed to serialize handshake: {}", e)))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Try to decode a handshake frame from the front of `buf`
///
/// Returns `Ok(None)` while the frame is incomplete. On success the frame is
/// consumed from `buf`, leaving only the bytes that followed it.
pub fn decode_handshake(buf: &mut BytesMut) -> Result<Option<HandshakeFrame>, ShroudError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_HANDSHAKE_LEN {
        return Err(ShroudError::HandshakeDecode(format!(
            "Declared handshake length {} exceeds limit of {}",
            len, MAX_HANDSHAKE_LEN
        )));
    }

    if buf.len() < LENGTH_PREFIX_LEN + len {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_LEN);
    let payload = buf.split_to(len);

    let frame: HandshakeFrame = serde_json::from_slice(&payload)
        .map_err(|e| ShroudError::HandshakeDecode(format!("Invalid handshake payload: {}", e)))?;

    if frame.host.is_empty() {
        return Err(ShroudError::HandshakeDecode("Empty destination host".to_string()));
    }

    Ok(Some(frame))
}

/// Read a handshake frame from the stream
///
/// Returns the frame and the bytes received after it.
pub async fn read_handshake<T: AsyncRead + Unpin>(
    conn: &mut T,
) -> Result<(HandshakeFrame, BytesMut), ShroudError> {
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some(frame) = decode_handshake(&mut buf)? {
            trace!("Handshake decoded: {:?}, {} trailing bytes", frame, buf.len());
            return Ok((frame, buf));
        }

        if conn.read_buf(&mut buf).await? == 0 {
            return Err(ShroudError::HandshakeDecode(
                "Connection closed before handshake completed".to_string(),
            ));
        }
    }
}

/// Write a handshake frame to the stream
pub async fn write_handshake<T: AsyncWrite + Unpin>(
    conn: &mut T,
    frame: &HandshakeFrame,
) -> Result<(), ShroudError> {
    let buf = encode_handshake(frame)?;
    conn.write_all(&buf).await?;
    conn.flush().await?;
    Ok(())
}
