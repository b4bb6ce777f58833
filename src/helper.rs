//! Helper utilities for Shroud
//!
//! This module provides common utility functions used throughout the application.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Time allowed for a tunnel client to deliver its handshake frame
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Pipe data between two streams until either direction ends
///
/// Both directions are copied concurrently. As soon as one direction hits
/// EOF or an error, the other is abandoned and both streams are dropped,
/// which closes the underlying sockets.
///
/// Returns `(a_to_b, b_to_a)`, the bytes delivered in each direction.
pub async fn pipe_streams<A, B>(a: A, b: B) -> (u64, u64)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let mut a_to_b = 0u64;
    let mut b_to_a = 0u64;

    tokio::select! {
        result = copy_counted(&mut a_read, &mut b_write, &mut a_to_b) => {
            if let Err(e) = result {
                debug!("A->B error: {}", e);
            }
        }
        result = copy_counted(&mut b_read, &mut a_write, &mut b_to_a) => {
            if let Err(e) = result {
                debug!("B->A error: {}", e);
            }
        }
    }

    debug!("Pipe finished: {} bytes A->B, {} bytes B->A", a_to_b, b_to_a);
    (a_to_b, b_to_a)
}

/// Copy until EOF, adding every delivered chunk to `count`
async fn copy_counted<R, W>(reader: &mut R, writer: &mut W, count: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *count += n as u64;
    }
}
