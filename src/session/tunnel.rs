//! CONNECT handling: an opaque byte tunnel to the target.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::http::{replies, Target};
use crate::net::{Connector, ProxyStream};
use crate::observability::metrics;

use super::relay::relay;
use super::{record_relay, Phase, Session};

impl<C, K> Session<C, K>
where
    C: ProxyStream,
    K: Connector,
{
    /// Connect, acknowledge with 200 (or 502 on failure) and relay raw bytes
    /// until either side ends. Bytes that arrived after the CONNECT header
    /// are passed on to the target before relaying starts.
    pub(super) async fn tunnel(&mut self, target: &Target, early_data: Bytes) -> Result<()> {
        let stream = match self.connector.connect(target).await {
            Ok(stream) => stream,
            Err(e) => {
                metrics::upstream_connect_failed();
                tracing::warn!(upstream = %target, error = %e, "Tunnel connect failed");
                if let Err(write_err) = self.client.write_all(replies::BAD_GATEWAY).await {
                    tracing::debug!(error = %write_err, "Failed to send 502");
                }
                return Err(e);
            }
        };
        let upstream = self.upstream.insert(stream);

        self.client.write_all(replies::CONNECTION_ESTABLISHED).await?;
        if !early_data.is_empty() {
            upstream.write_all(&early_data).await?;
        }
        self.phase.advance(Phase::Tunneling);
        metrics::tunnel_established();

        let outcome = relay(
            &mut self.client,
            upstream,
            self.settings.half_close,
            self.settings.read_buffer_bytes,
        )
        .await;
        record_relay(&outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::error::ProxyError;
    use crate::session::testing::{session, MockConnector};
    use crate::session::SessionSettings;

    #[tokio::test]
    async fn connect_success_acknowledges_and_relays() {
        let connector = Arc::new(MockConnector::default());
        let mut target_end = connector.expect(Target::new("secure.test", 443));
        let (mut session, mut client) = session(connector, SessionSettings::default());

        let task = tokio::spawn(async move {
            let res = session.run().await;
            (res, session.phase(), session.has_upstream())
        });

        client
            .write_all(b"CONNECT secure.test:443 HTTP/1.1\r\nHost: secure.test:443\r\n\r\n")
            .await
            .unwrap();

        let mut ack = [0u8; 19];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, replies::CONNECTION_ESTABLISHED);

        client.write_all(b"\x16\x03\x01hello").await.unwrap();
        let mut buf = [0u8; 8];
        target_end.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x16\x03\x01hello");

        target_end.write_all(b"\x16\x03\x03world").await.unwrap();
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x16\x03\x03world");

        // Target hangs up: the client side must be closed too.
        drop(target_end);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let (res, phase, has_upstream) = task.await.unwrap();
        assert!(res.is_ok());
        assert_eq!(phase, Phase::Closed);
        assert!(!has_upstream);
    }

    #[tokio::test]
    async fn connect_failure_replies_502_and_closes() {
        let connector = Arc::new(MockConnector::default());
        let (mut session, mut client) = session(connector.clone(), SessionSettings::default());

        client
            .write_all(b"CONNECT nowhere.test:443 HTTP/1.1\r\nHost: nowhere.test:443\r\n\r\n")
            .await
            .unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamConnect { .. }));
        assert_eq!(session.phase(), Phase::Closed);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, replies::BAD_GATEWAY);
        assert_eq!(
            connector.attempts.lock().unwrap().as_slice(),
            &[Target::new("nowhere.test", 443)]
        );
    }

    #[tokio::test]
    async fn early_data_is_forwarded_after_ack() {
        let connector = Arc::new(MockConnector::default());
        let mut target_end = connector.expect(Target::new("early.test", 8443));
        let (mut session, mut client) = session(connector, SessionSettings::default());

        let task = tokio::spawn(async move { session.run().await });

        client
            .write_all(b"CONNECT early.test:8443 HTTP/1.1\r\n\r\nCLIENTHELLO")
            .await
            .unwrap();

        let mut buf = [0u8; 11];
        target_end.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"CLIENTHELLO");

        drop(client);
        let mut rest = Vec::new();
        target_end.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn client_closing_mid_tunnel_closes_target() {
        let connector = Arc::new(MockConnector::default());
        let mut target_end = connector.expect(Target::new("mid.test", 443));
        let (mut session, mut client) = session(connector, SessionSettings::default());

        let task = tokio::spawn(async move {
            let res = session.run().await;
            (res, session.phase(), session.has_upstream())
        });

        client
            .write_all(b"CONNECT mid.test:443 HTTP/1.1\r\nHost: mid.test:443\r\n\r\n")
            .await
            .unwrap();
        let mut ack = [0u8; 19];
        client.read_exact(&mut ack).await.unwrap();

        client.write_all(b"partial").await.unwrap();
        let mut buf = [0u8; 7];
        target_end.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"partial");

        drop(client);
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), target_end.read_to_end(&mut rest))
            .await
            .expect("target was not closed")
            .unwrap();
        assert!(rest.is_empty());

        let (res, phase, has_upstream) = task.await.unwrap();
        assert!(res.is_ok());
        assert_eq!(phase, Phase::Closed);
        assert!(!has_upstream);
    }
}
