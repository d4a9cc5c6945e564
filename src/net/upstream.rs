//! Outbound connections to target hosts.
//!
//! Sessions only ever see the [`Connector`] trait, so tests can hand them
//! in-memory streams instead of sockets.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::http::Target;
use crate::resilience::timeouts::with_deadline;

/// A byte stream a session can relay over.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens upstream connections for sessions.
pub trait Connector: Send + Sync + 'static {
    type Stream: ProxyStream;

    /// Connect to `target`, failing with `UpstreamConnect` or
    /// `ConnectTimeout`.
    fn connect(&self, target: &Target) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Plain TCP connector used by the server.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, target: &Target) -> Result<TcpStream> {
        let addr = target.socket_addr();
        let stream = with_deadline(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|elapsed| ProxyError::ConnectTimeout {
                target: target.clone(),
                secs: elapsed.0.as_secs(),
            })?
            .map_err(|source| ProxyError::UpstreamConnect {
                target: target.clone(),
                source,
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on upstream");
        }
        tracing::debug!(upstream = %target, "Upstream connected");
        Ok(stream)
    }
}
