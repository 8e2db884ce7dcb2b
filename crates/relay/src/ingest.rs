//! Ingestion service: one frame in, one ACK/NAK out, per iteration
//!
//! ```text
//! ReadFrame -> valid    -> upsert + broadcast -> ACK -> ReadFrame
//!           -> invalid  -> NAK                       -> ReadFrame
//!           -> closed / transport error              -> done
//! ```

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use telerelay_protocol::{read_frame, Frame, Response};

use crate::relay::{wait_for_shutdown, Relay};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub accepted: u64,
    pub rejected: u64,
}

impl Relay {
    /// Serve one source connection until the peer leaves, the stream fails,
    /// or shutdown is signalled.
    pub async fn handle_source<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionSummary
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut summary = SessionSummary::default();

        self.metrics().source_connections.inc();
        info!(peer = %peer, "source connected");

        loop {
            let result = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!(peer = %peer, "shutdown, closing source connection");
                    break;
                }
                result = read_frame(&mut reader) => result,
            };

            let response = match result {
                Ok(Some(frame)) => {
                    self.accept_frame(&frame).await;
                    summary.accepted += 1;
                    self.metrics().inc_ack();
                    Response::Ack {
                        sequence: frame.sequence,
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "source closed connection");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(peer = %peer, error = %e, "rejecting frame");
                    summary.rejected += 1;
                    self.metrics().inc_nak(e.reason());
                    Response::Nak
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "source stream failed");
                    break;
                }
            };

            if let Err(e) = writer.write_all(&response.encode()).await {
                debug!(peer = %peer, error = %e, "failed to answer source");
                break;
            }
        }

        self.metrics().source_connections.dec();
        info!(
            peer = %peer,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "source disconnected"
        );
        summary
    }

    /// Update the registry, then fan the field reports out.
    async fn accept_frame(&self, frame: &Frame) {
        let created = self
            .sources()
            .upsert(frame.source_id, frame.status, frame.sequence)
            .await;
        if created {
            info!(source = %frame.source_id, status = %frame.status, "new source");
            self.metrics().sources_known.set(self.sources().len() as i64);
        }

        let report = self.listeners().broadcast(&frame.source_id, &frame.fields);
        debug!(
            source = %frame.source_id,
            sequence = frame.sequence,
            fields = frame.fields.len(),
            listeners = report.delivered,
            "frame accepted"
        );

        self.metrics()
            .lines_broadcast
            .inc_by((report.lines * report.delivered) as u64);
        if report.dropped > 0 {
            self.metrics()
                .listeners_dropped
                .inc_by(report.dropped as u64);
            self.metrics().listeners.set(self.listeners().len() as i64);
        }
    }
}
