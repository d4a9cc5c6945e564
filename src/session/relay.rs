//! Raw byte relay between the two ends of a session.
//!
//! A relay runs one pump per direction. With the default policy the first
//! pump to finish (EOF or error) ends the relay and the other pump is
//! dropped. With `half_close` an EOF is forwarded as a write shutdown and
//! the opposite direction keeps going until it finishes too.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Side;
use crate::net::ProxyStream;

/// Byte counts for both directions of a relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// How a relay finished.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Reading side of the direction whose end stopped the relay.
    pub ended_by: Side,
    /// Set when that direction failed rather than reaching EOF.
    pub error: Option<io::Error>,
    pub stats: RelayStats,
}

/// Copy `reader` into `writer` until EOF, counting bytes in `copied`.
///
/// On EOF the writer is shut down when `half_close` is set, otherwise just
/// flushed.
pub async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    half_close: bool,
    buf_size: usize,
    copied: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
    if half_close {
        writer.shutdown().await
    } else {
        Ok(())
    }
}

/// Drive both directions until the relay is over.
///
/// Returns which direction ended it and that direction's error, if any.
pub async fn join_directions<A, B>(
    client_to_upstream: A,
    upstream_to_client: B,
    half_close: bool,
) -> (Side, Option<io::Error>)
where
    A: Future<Output = io::Result<()>>,
    B: Future<Output = io::Result<()>>,
{
    tokio::pin!(client_to_upstream, upstream_to_client);

    tokio::select! {
        res = &mut client_to_upstream => match res {
            Ok(()) if half_close => (Side::Upstream, upstream_to_client.await.err()),
            res => (Side::Client, res.err()),
        },
        res = &mut upstream_to_client => match res {
            Ok(()) if half_close => (Side::Client, client_to_upstream.await.err()),
            res => (Side::Upstream, res.err()),
        },
    }
}

/// Relay raw bytes between `client` and `upstream` in both directions.
pub async fn relay<C, U>(
    client: &mut C,
    upstream: &mut U,
    half_close: bool,
    buf_size: usize,
) -> RelayOutcome
where
    C: ProxyStream,
    U: ProxyStream,
{
    let mut stats = RelayStats::default();
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut up_rd, mut up_wr) = tokio::io::split(upstream);

    let (ended_by, error) = join_directions(
        pump(
            &mut client_rd,
            &mut up_wr,
            half_close,
            buf_size,
            &mut stats.client_to_upstream,
        ),
        pump(
            &mut up_rd,
            &mut client_wr,
            half_close,
            buf_size,
            &mut stats.upstream_to_client,
        ),
        half_close,
    )
    .await;

    RelayOutcome {
        ended_by,
        error,
        stats,
    }
}
