//! The stream transfer loop: pumps bytes from one pipe end into another.
//!
//! The destination tool treats its input as one continuous elementary stream,
//! so a chunk is either written in full or the transfer fails; a partial
//! write retried at a shifted offset would corrupt the result. On every exit
//! path the sink's write side is shut down so the downstream process sees
//! end-of-input instead of hanging on a half-open pipe.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use dvx_core::{Error, Result};

/// Chunk size used between pipeline stages: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Copy bytes from `source` to `sink` until EOF, error, or cancellation.
///
/// Returns the total number of bytes moved on success.
///
/// # Errors
///
/// - [`Error::Canceled`] when the token fires mid-transfer.
/// - [`Error::Transfer`] on any read or write failure; the error is returned
///   rather than retried.
pub async fn transfer<R, W>(
    mut source: R,
    mut sink: W,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.shutdown().await;
                return Err(Error::Canceled);
            }
            read = source.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let _ = sink.shutdown().await;
                return Err(Error::transfer(format!("read failed: {e}")));
            }
        };

        let write = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.shutdown().await;
                return Err(Error::Canceled);
            }
            write = sink.write_all(&buf[..n]) => write,
        };

        if let Err(e) = write {
            let _ = sink.shutdown().await;
            return Err(Error::transfer(format!("write failed: {e}")));
        }

        total += n as u64;
    }

    sink.shutdown()
        .await
        .map_err(|e| Error::transfer(format!("close failed: {e}")))?;

    tracing::debug!(bytes = total, "transfer complete");
    Ok(total)
}
