//! Listener service: register a new listener and hand it the snapshot

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::listeners::Delivery;
use crate::relay::Relay;

impl Relay {
    /// Take over an accepted listener connection.
    ///
    /// The connection is write-only from here on; anything the peer sends is
    /// never read.
    pub async fn handle_listener<S>(&self, stream: S, peer: SocketAddr) -> Delivery
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (_unread, writer) = tokio::io::split(stream);
        let snapshot = self.sources().render_snapshot().await;

        let delivery = self.listeners().register(peer, writer, snapshot).await;
        match delivery {
            Delivery::Delivered => {
                info!(peer = %peer, sources = self.sources().len(), "listener connected");
            }
            Delivery::Closed => {
                debug!(peer = %peer, "listener not kept");
                self.metrics().listeners_dropped.inc();
            }
        }
        self.metrics().listeners.set(self.listeners().len() as i64);
        delivery
    }
}
