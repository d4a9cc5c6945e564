//! Plain HTTP forwarding with one header rewrite per direction.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, Side};
use crate::http::rewrite::crlf_lines;
use crate::http::{rewrite, HeaderAssembler, Target};
use crate::net::{Connector, ProxyStream};
use crate::observability::metrics;

use super::relay::{join_directions, pump, RelayOutcome, RelayStats};
use super::{encode_head, read_header, record_relay, Phase, Session};

impl<C, K> Session<C, K>
where
    C: ProxyStream,
    K: Connector,
{
    /// Forward a non-CONNECT request.
    ///
    /// The request header is rewritten and sent with any payload bytes that
    /// came with it. Client bytes then flow upstream verbatim while the
    /// response header is assembled; once it is complete it is rewritten
    /// and sent to the client, and the rest of the response is relayed
    /// verbatim.
    pub(super) async fn forward(&mut self, header: &[u8], target: &Target, payload: Bytes) -> Result<()> {
        let stream = match self.connector.connect(target).await {
            Ok(stream) => stream,
            Err(e) => {
                metrics::upstream_connect_failed();
                tracing::warn!(
                    "Unable to establish connection to {} on port {}: {}",
                    target.host,
                    target.port,
                    e
                );
                return Err(e);
            }
        };
        let upstream = self.upstream.insert(stream);

        upstream.write_all(&encode_head(&rewrite(header), &payload)).await?;
        metrics::request_forwarded();
        self.phase.advance(Phase::AwaitingResponseHeader);

        let half_close = self.settings.half_close;
        let buf_size = self.settings.read_buffer_bytes;
        let phase = &mut self.phase;
        let mut stats = RelayStats::default();
        let mut response = HeaderAssembler::new(self.settings.max_header_bytes);

        let (mut client_rd, mut client_wr) = tokio::io::split(&mut self.client);
        let (mut up_rd, mut up_wr) = tokio::io::split(upstream);

        let (ended_by, error) = {
            // Client → upstream runs from here on, across the response
            // header phase, so no client bytes are dropped.
            let to_upstream = pump(
                &mut client_rd,
                &mut up_wr,
                half_close,
                buf_size,
                &mut stats.client_to_upstream,
            );
            tokio::pin!(to_upstream);
            let mut client_done = false;

            let head = tokio::select! {
                res = &mut to_upstream => {
                    match res {
                        Ok(()) if half_close => {
                            client_done = true;
                            read_header(&mut up_rd, &mut response, buf_size, Side::Upstream).await
                        }
                        res => {
                            tracing::debug!("Client finished before the response header");
                            return res.map_err(Into::into);
                        }
                    }
                }
                res = read_header(&mut up_rd, &mut response, buf_size, Side::Upstream) => res,
            };
            let head = match head {
                Ok(head) => head,
                Err(e) => {
                    tracing::debug!(error = %e, "No response header from upstream");
                    return Err(e);
                }
            };

            let rewritten = rewrite(&head.header);
            if let Some(status_line) = crlf_lines(&rewritten).next() {
                tracing::debug!("<<< {}", String::from_utf8_lossy(status_line));
            }
            client_wr.write_all(&encode_head(&rewritten, &head.trailing)).await?;
            phase.advance(Phase::Streaming);

            let to_client = pump(
                &mut up_rd,
                &mut client_wr,
                half_close,
                buf_size,
                &mut stats.upstream_to_client,
            );
            if client_done {
                (Side::Upstream, to_client.await.err())
            } else {
                join_directions(to_upstream, to_client, half_close).await
            }
        };

        record_relay(&RelayOutcome {
            ended_by,
            error,
            stats,
        });
        Ok(())
    }
}
