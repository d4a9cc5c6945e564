//! Per-connection session state machine.
//!
//! # Data Flow
//! ```text
//! AwaitingRequestHeader
//!     ├─ CONNECT → tunnel.rs:  connect → 200 → Tunneling → Closed
//!     │                        connect failed → 502 → Closed
//!     └─ other   → forward.rs: connect → rewritten request upstream
//!                              → AwaitingResponseHeader → rewritten response
//!                              → Streaming → Closed
//!                              connect failed → Closed (no reply)
//! ```
//!
//! A session owns both streams and is driven by a single task; nothing is
//! shared with other sessions.

pub mod forward;
pub mod relay;
pub mod tunnel;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result, Side};
use crate::http::{replies, Assembled, HeaderAssembler, HeaderBlock, ParsedHeader, Target, HEADER_TERMINATOR};
use crate::net::connection::ConnectionId;
use crate::net::{Connector, ProxyStream};
use crate::observability::metrics;

use self::relay::RelayOutcome;

/// Where a session is in its life. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRequestHeader,
    Tunneling,
    AwaitingResponseHeader,
    Streaming,
    Closed,
}

impl Phase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (AwaitingRequestHeader, Tunneling)
                | (AwaitingRequestHeader, AwaitingResponseHeader)
                | (AwaitingResponseHeader, Streaming)
                | (AwaitingRequestHeader | Tunneling | AwaitingResponseHeader | Streaming, Closed)
        )
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(self.can_advance_to(next), "illegal phase change {:?} -> {:?}", self, next);
        tracing::trace!(from = ?*self, to = ?next, "Phase change");
        *self = next;
    }
}

/// Per-session knobs taken from the proxy configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_header_bytes: usize,
    pub read_buffer_bytes: usize,
    pub half_close: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for SessionSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            max_header_bytes: config.limits.max_header_bytes,
            read_buffer_bytes: config.limits.read_buffer_bytes,
            half_close: config.relay.half_close,
        }
    }
}

/// One client connection and, once resolved, its upstream connection.
pub struct Session<C, K: Connector> {
    id: ConnectionId,
    client: C,
    upstream: Option<K::Stream>,
    request: HeaderAssembler,
    phase: Phase,
    target: Option<Target>,
    connector: Arc<K>,
    settings: SessionSettings,
}

impl<C, K> Session<C, K>
where
    C: ProxyStream,
    K: Connector,
{
    pub fn new(id: ConnectionId, client: C, connector: Arc<K>, settings: SessionSettings) -> Self {
        Self {
            id,
            client,
            upstream: None,
            request: HeaderAssembler::new(settings.max_header_bytes),
            phase: Phase::AwaitingRequestHeader,
            target: None,
            connector,
            settings,
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Target resolved from the request header, once known.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn has_upstream(&self) -> bool {
        self.upstream.is_some()
    }

    /// Run the session to completion. Both streams are closed on return,
    /// whatever the outcome.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.drive().await;
        self.teardown().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        let block = match read_header(
            &mut self.client,
            &mut self.request,
            self.settings.read_buffer_bytes,
            Side::Client,
        )
        .await
        {
            Ok(block) => block,
            Err(e) => {
                self.reject(&e).await;
                return Err(e);
            }
        };

        let header = block.header_text();
        let (request, target) = match ParsedHeader::parse(&header)
            .and_then(|request| request.target().map(|target| (request, target)))
        {
            Ok(parsed) => parsed,
            Err(e) => {
                self.reject(&e).await;
                return Err(e);
            }
        };

        tracing::info!(upstream = %target, ">>> {}", request.request_line);
        self.target = Some(target.clone());

        if request.is_connect() {
            self.tunnel(&target, block.trailing).await
        } else {
            self.forward(&block.header, &target, block.trailing).await
        }
    }

    /// Answer requests the proxy refuses to handle. Connection-level
    /// failures get no reply.
    async fn reject(&mut self, err: &ProxyError) {
        let reply = match err {
            ProxyError::HeaderTooLarge { .. } => {
                metrics::request_rejected("header_too_large");
                replies::HEADER_TOO_LARGE
            }
            ProxyError::MalformedRequest(_) => {
                metrics::request_rejected("malformed");
                replies::BAD_REQUEST
            }
            _ => return,
        };
        if let Err(e) = self.client.write_all(reply).await {
            tracing::debug!(error = %e, "Failed to write rejection");
        }
    }

    /// Close both connections. Only the first call has any effect; it
    /// returns `true`, later calls return `false`.
    pub async fn teardown(&mut self) -> bool {
        if self.phase == Phase::Closed {
            return false;
        }
        self.phase.advance(Phase::Closed);

        if let Err(e) = self.client.shutdown().await {
            tracing::trace!(error = %e, "Client shutdown failed");
        }
        if let Some(mut upstream) = self.upstream.take() {
            if let Err(e) = upstream.shutdown().await {
                tracing::trace!(error = %e, "Upstream shutdown failed");
            }
        }
        tracing::debug!(connection_id = %self.id, "Session torn down");
        true
    }
}

/// Read from `reader` into `assembler` until a header block is complete.
pub(crate) async fn read_header<R>(
    reader: &mut R,
    assembler: &mut HeaderAssembler,
    buf_size: usize,
    side: Side,
) -> Result<HeaderBlock>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ProxyError::PeerClosed(side));
        }
        if let Assembled::Complete(block) = assembler.feed(&buf[..n])? {
            return Ok(block);
        }
    }
}

/// Rewritten header, blank line, then any bytes that arrived with it.
pub(crate) fn encode_head(header: &[u8], trailing: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(header.len() + HEADER_TERMINATOR.len() + trailing.len());
    out.extend_from_slice(header);
    out.extend_from_slice(HEADER_TERMINATOR);
    out.extend_from_slice(trailing);
    out.freeze()
}

/// Log and count the end of a relay.
pub(crate) fn record_relay(outcome: &RelayOutcome) {
    metrics::bytes_relayed(
        outcome.stats.client_to_upstream,
        outcome.stats.upstream_to_client,
    );
    match &outcome.error {
        Some(e) => tracing::debug!(
            side = %outcome.ended_by,
            error = %e,
            sent = outcome.stats.client_to_upstream,
            received = outcome.stats.upstream_to_client,
            "Relay ended with error"
        ),
        None => tracing::debug!(
            side = %outcome.ended_by,
            sent = outcome.stats.client_to_upstream,
            received = outcome.stats.upstream_to_client,
            "Relay ended"
        ),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector for driving sessions without sockets.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use tokio::io::DuplexStream;

    use super::*;

    /// Hands out pre-registered duplex streams; unknown targets are refused.
    #[derive(Default)]
    pub struct MockConnector {
        streams: Mutex<HashMap<Target, DuplexStream>>,
        pub attempts: Mutex<Vec<Target>>,
    }

    impl MockConnector {
        /// Register `target` and return the far end of its stream.
        pub fn expect(&self, target: Target) -> DuplexStream {
            let (proxy_end, far_end) = tokio::io::duplex(64 * 1024);
            self.streams.lock().unwrap().insert(target, proxy_end);
            far_end
        }
    }

    impl Connector for MockConnector {
        type Stream = DuplexStream;

        async fn connect(&self, target: &Target) -> Result<DuplexStream> {
            self.attempts.lock().unwrap().push(target.clone());
            let stream = self.streams.lock().unwrap().remove(target);
            stream.ok_or_else(|| ProxyError::UpstreamConnect {
                target: target.clone(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
        }
    }

    /// A session over an in-memory client stream, plus the client's end.
    pub fn session(
        connector: Arc<MockConnector>,
        settings: SessionSettings,
    ) -> (Session<DuplexStream, MockConnector>, DuplexStream) {
        let (client, proxy_end) = tokio::io::duplex(64 * 1024);
        (Session::new(ConnectionId::new(), proxy_end, connector, settings), client)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        use Phase::*;
        assert!(AwaitingRequestHeader.can_advance_to(Tunneling));
        assert!(AwaitingRequestHeader.can_advance_to(AwaitingResponseHeader));
        assert!(AwaitingResponseHeader.can_advance_to(Streaming));
        assert!(Streaming.can_advance_to(Closed));
        assert!(Tunneling.can_advance_to(Closed));

        assert!(!Tunneling.can_advance_to(AwaitingRequestHeader));
        assert!(!Streaming.can_advance_to(AwaitingResponseHeader));
        assert!(!Tunneling.can_advance_to(Streaming));
        assert!(!Closed.can_advance_to(Closed));
        assert!(!Closed.can_advance_to(AwaitingRequestHeader));
    }

    #[test]
    fn encode_head_appends_terminator_and_payload() {
        let out = encode_head(b"GET / HTTP/1.0", b"body");
        assert_eq!(&out[..], b"GET / HTTP/1.0\r\n\r\nbody");
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let connector = Arc::new(MockConnector::default());
        let (mut session, mut client) = session(connector, SessionSettings::default());

        assert!(session.teardown().await);
        assert_eq!(session.phase(), Phase::Closed);
        assert!(!session.teardown().await);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn client_closing_before_header_ends_session() {
        let connector = Arc::new(MockConnector::default());
        let (mut session, mut client) = session(connector.clone(), SessionSettings::default());

        client.write_all(b"GET / HTTP/1.1\r\nHost: a").await.unwrap();
        client.shutdown().await.unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ProxyError::PeerClosed(Side::Client)));
        assert_eq!(session.phase(), Phase::Closed);
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_request_header_gets_431() {
        let connector = Arc::new(MockConnector::default());
        let settings = SessionSettings {
            max_header_bytes: 32,
            ..SessionSettings::default()
        };
        let (mut session, mut client) = session(connector, settings);

        client
            .write_all(b"GET / HTTP/1.1\r\nX-Padding: aaaaaaaaaaaaaaaaaaaaaaaa")
            .await
            .unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ProxyError::HeaderTooLarge { limit: 32 }));

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, replies::HEADER_TOO_LARGE);
    }

    #[tokio::test]
    async fn request_without_host_gets_400() {
        let connector = Arc::new(MockConnector::default());
        let (mut session, mut client) = session(connector, SessionSettings::default());

        client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").await.unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, replies::BAD_REQUEST);
        assert!(session.target().is_none());
    }
}
