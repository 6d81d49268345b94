//! Bidirectional relay between two streams.
//!
//! Both directions run concurrently, each with its own pooled buffer. The
//! first direction to finish ends the relay: reaching end-of-stream is a
//! normal finish, only I/O errors are reported.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::SocksError;
use crate::pool::relay_pool;

/// Relay data bidirectionally between two streams.
///
/// Returns when either direction reaches end-of-stream or fails. The
/// unfinished direction is dropped; bytes it had read but not yet written are
/// not reported.
pub async fn relay<A, B>(a: A, b: B) -> Result<(), SocksError>
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = pump(&mut a_read, &mut b_write);
    let b_to_a = pump(&mut b_read, &mut a_write);

    let result = tokio::select! {
        result = a_to_b => result.inspect(|bytes| debug!("A->B finished: {} bytes", bytes)),
        result = b_to_a => result.inspect(|bytes| debug!("B->A finished: {} bytes", bytes)),
    };

    result.map(|_| ()).map_err(|e| {
        debug!("relay error: {}", e);
        e.into()
    })
}

/// Copies `reader` into `writer` until end-of-stream.
async fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = relay_pool().acquire();
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.flush().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
