//! Proxy server: accept loop and session spawning.
//!
//! # Responsibilities
//! - Accept client connections through the bounded listener
//! - Spawn one session task per connection, inside a tracing span
//! - Back off while accept keeps failing
//! - Stop accepting when shutdown is triggered

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::ConnectionPermit;
use crate::net::{Connector, Listener, TcpConnector};
use crate::resilience::backoff::backoff_delay;
use crate::session::{Session, SessionSettings};

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Forward proxy server.
pub struct ProxyServer<K: Connector = TcpConnector> {
    connector: Arc<K>,
    settings: SessionSettings,
    tracker: ConnectionTracker,
}

impl ProxyServer<TcpConnector> {
    /// Create a server that connects upstream over TCP.
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_connector(config, TcpConnector::new(config.timeouts.connect()))
    }
}

impl<K: Connector> ProxyServer<K> {
    pub fn with_connector(config: &ProxyConfig, connector: K) -> Self {
        Self {
            connector: Arc::new(connector),
            settings: SessionSettings::from(config),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Sessions already running are not waited for.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy listening on {}", addr);

        let mut accept_failures = 0u32;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Listener stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        accept_failures = 0;
                        self.spawn_session(stream, peer, permit);
                    }
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let delay = backoff_delay(accept_failures, ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX);
                        tracing::warn!(error = %e, attempt = accept_failures, ?delay, "Accept failed");
                        tokio::select! {
                            _ = shutdown.recv() => {
                                tracing::info!("Listener stopped");
                                return Ok(());
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on client");
        }
        let guard = self.tracker.track();
        let id = guard.id();
        let span = tracing::info_span!("session", conn_id = %id, peer = %peer);
        span.in_scope(|| {
            tracing::debug!(active_sessions = self.tracker.active_count(), "Session started")
        });
        let mut session = Session::new(id, stream, Arc::clone(&self.connector), self.settings);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                let result = session.run().await;
                let upstream = session.target().map(ToString::to_string).unwrap_or_default();
                match result {
                    Ok(()) => tracing::debug!(%upstream, "Session complete"),
                    Err(e) if e.is_connect_failure() => {
                        tracing::debug!(%upstream, error = %e, "Session ended: target unreachable")
                    }
                    Err(e) => tracing::debug!(%upstream, error = %e, "Session ended early"),
                }
            }
            .instrument(span),
        );
    }
}
