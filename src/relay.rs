//! Outbound connections and the bidirectional relay engine.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Open a TCP connection to `host:port`, bounded by `timeout`.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::Network(e)),
        Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
    }
}

/// Copy bytes in both directions between two established connections
/// until either side reaches end-of-stream or errors.
///
/// EOF and resets are the expected way a relay ends, so they are logged
/// at debug and never surfaced to the caller. Both connections are closed
/// when the caller drops them on return.
pub async fn exchange<A, B>(a: &mut A, b: &mut B, buffer_size: usize)
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match tokio::io::copy_bidirectional_with_sizes(a, b, buffer_size, buffer_size).await {
        Ok((up, down)) => {
            tracing::debug!("relay finished: {} bytes up, {} bytes down", up, down);
        }
        Err(e) => {
            tracing::debug!("relay terminated: {}", e);
        }
    }
}

/// Read a single buffer from a handshake-phase stream, bounded by `timeout`.
///
/// End-of-stream before any handshake byte is an error: the session cannot
/// proceed without data.
pub(crate) async fn read_buffer<S>(
    stream: &mut S,
    buffer_size: usize,
    timeout: Duration,
) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let n = match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(Error::Network(e)),
        Err(_) => return Err(Error::Timeout(timeout.as_millis() as u64)),
    };
    if n == 0 {
        return Err(Error::Network(std::io::ErrorKind::UnexpectedEof.into()));
    }
    buf.truncate(n);
    Ok(buf)
}
