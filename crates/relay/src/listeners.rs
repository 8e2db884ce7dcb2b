//! Connected listeners and the field-line fan-out
//!
//! Every listener owns an unbounded queue drained by its own writer task, so a
//! slow socket never stalls a broadcast and never loses lines. A listener is
//! removed the first time delivery to it fails; there is no other close path.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use telerelay_protocol::{render_fields, FieldReport, SourceId};

/// Outcome of handing bytes to a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Closed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Listeners the lines were queued for
    pub delivered: usize,
    /// Listeners removed during this broadcast
    pub dropped: usize,
    /// Lines per listener
    pub lines: usize,
}

struct ListenerHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ListenerHandle {
    /// Fails only once the writer task has gone away.
    fn deliver(&self, chunk: Bytes) -> Delivery {
        match self.tx.send(chunk) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Closed,
        }
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<SocketAddr, ListenerHandle>,
    closed: AtomicBool,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `snapshot` to the listener, then start feeding it live lines.
    ///
    /// The snapshot goes straight to the socket before the listener becomes
    /// visible to broadcasts, so it always precedes live lines. If that write
    /// fails, or the registry is already closed, the listener is never kept.
    pub async fn register<W>(&self, addr: SocketAddr, mut writer: W, snapshot: Bytes) -> Delivery
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if !snapshot.is_empty() {
            if let Err(e) = writer.write_all(&snapshot).await {
                debug!(peer = %addr, error = %e, "snapshot write failed");
                return Delivery::Closed;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(addr, rx, writer));
        self.listeners.insert(addr, ListenerHandle { tx });

        // close_all sets the flag before clearing, so a listener inserted
        // concurrently with it is caught here.
        if self.closed.load(Ordering::SeqCst) {
            self.listeners.remove(&addr);
            debug!(peer = %addr, "registry closed, listener not kept");
            return Delivery::Closed;
        }
        Delivery::Delivered
    }

    /// Queue one line per field to every listener, in field order.
    ///
    /// Listeners that can no longer be written to are removed. Never fails.
    pub fn broadcast(&self, source_id: &SourceId, fields: &[FieldReport]) -> BroadcastReport {
        let mut report = BroadcastReport {
            lines: fields.len(),
            ..Default::default()
        };
        if fields.is_empty() {
            return report;
        }

        let chunk = render_fields(source_id, fields);
        self.listeners
            .retain(|addr, handle| match handle.deliver(chunk.clone()) {
                Delivery::Delivered => {
                    report.delivered += 1;
                    true
                }
                Delivery::Closed => {
                    debug!(peer = %addr, "removing closed listener");
                    report.dropped += 1;
                    false
                }
            });
        report
    }

    /// Drop every listener and refuse new ones; writer tasks flush what is
    /// queued and close.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.listeners.clear();
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.listeners.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

async fn write_loop<W>(addr: SocketAddr, mut rx: mpsc::UnboundedReceiver<Bytes>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = writer.write_all(&chunk).await {
            // Dropping rx marks the handle closed for the next delivery
            debug!(peer = %addr, error = %e, "listener write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
    debug!(peer = %addr, "listener writer finished");
}
