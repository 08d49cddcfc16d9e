//! Length-delimited byte streaming.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Transfer buffer size.
pub const CHUNK_SIZE: usize = 4096;

/// Copy exactly `size` bytes from `reader` to `writer` in `CHUNK_SIZE` pieces.
///
/// Each read and each write must make progress within `chunk_timeout`, else
/// the copy fails with `TimedOut`. Running out of input before `size` bytes
/// fails with `UnexpectedEof`.
pub async fn stream_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
    chunk_timeout: Duration,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = size;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = timeout(chunk_timeout, reader.read(&mut buf[..want]))
            .await
            .map_err(|_| timed_out("read"))??;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {remaining} of {size} bytes outstanding"),
            ));
        }
        timeout(chunk_timeout, writer.write_all(&buf[..n]))
            .await
            .map_err(|_| timed_out("write"))??;
        remaining -= n as u64;
    }

    timeout(chunk_timeout, writer.flush())
        .await
        .map_err(|_| timed_out("flush"))??;
    Ok(size)
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("transfer {op} timed out"))
}
