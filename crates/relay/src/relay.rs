use quanta::Clock;
use tokio::sync::watch;

use crate::listeners::ListenerRegistry;
use crate::metrics::RelayMetrics;
use crate::registry::SourceRegistry;

/// Shared state behind both services
pub struct Relay {
    sources: SourceRegistry,
    listeners: ListenerRegistry,
    metrics: RelayMetrics,
}

impl Relay {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            sources: SourceRegistry::new(clock),
            listeners: ListenerRegistry::new(),
            metrics: RelayMetrics::new(),
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Close every listener channel and refuse new listeners
    pub fn shutdown(&self) {
        self.listeners.close_all();
        self.metrics.listeners.set(0);
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown is signalled. A dropped sender never signals.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let signalled = rx.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}
