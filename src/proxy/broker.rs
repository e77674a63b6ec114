//! Unidirectional byte pump between two established connections.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

/// How one pump run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reported a clean end-of-stream.
    Eof,
    /// The stop signal fired, or a read/write error cut the copy short.
    Aborted,
}

/// Copy bytes from `src` to `dst` until end-of-stream, a copy error, or a
/// signal on `stop`.
///
/// The stop signal only interrupts the blocking read; a write already in
/// flight completes first. On completion the write side of `dst` is shut
/// down so the far end observes the half-close, and the total byte count
/// is returned along with how the copy ended. Copy errors are logged, not
/// propagated: a broken peer is a recoverable event, not a fatal one.
pub async fn pump<R, W>(
    mut src: R,
    mut dst: W,
    mut stop: oneshot::Receiver<()>,
    direction: &'static str,
) -> (u64, PumpEnd)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut total = 0u64;
    let mut end = PumpEnd::Aborted;

    loop {
        let n = tokio::select! {
            _ = &mut stop => break,
            read = src.read(&mut buf) => match read {
                Ok(0) => {
                    end = PumpEnd::Eof;
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(direction, error = %e, "read failed");
                    break;
                }
            },
        };

        if let Err(e) = dst.write_all(&buf[..n]).await {
            debug!(direction, error = %e, "write failed");
            break;
        }
        total += n as u64;
    }

    let _ = dst.shutdown().await;
    (total, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn pumps_until_source_closes() {
        let (client, mut client_far) = duplex(64);
        let (server, mut server_far) = duplex(64);
        let (read_half, _keep_write) = tokio::io::split(client);
        let (_keep_read, write_half) = tokio::io::split(server);

        let (_stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(pump(read_half, write_half, stop_rx, "test"));

        client_far.write_all(b"hello").await.unwrap();
        client_far.shutdown().await.unwrap();

        let (total, end) = handle.await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(end, PumpEnd::Eof);

        let mut out = Vec::new();
        server_far.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn stop_signal_unblocks_idle_read() {
        let (client, _client_far) = duplex(64);
        let (server, _server_far) = duplex(64);
        let (read_half, _keep_write) = tokio::io::split(client);
        let (_keep_read, write_half) = tokio::io::split(server);

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(pump(read_half, write_half, stop_rx, "test"));

        stop_tx.send(()).unwrap();
        let (total, end) = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("pump did not observe stop signal")
            .unwrap();
        assert_eq!(total, 0);
        assert_eq!(end, PumpEnd::Aborted);
    }
}
