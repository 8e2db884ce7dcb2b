//! TCP endpoints and the health/metrics HTTP server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::{wait_for_shutdown, Relay};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Both relay endpoints, bound and ready to accept
pub struct RelayServer {
    relay: Arc<Relay>,
    sources: TcpListener,
    listeners: TcpListener,
}

impl RelayServer {
    pub async fn bind(config: &Config, relay: Arc<Relay>) -> Result<Self, RelayError> {
        let source_addr = config.source_bind();
        let sources = TcpListener::bind(&source_addr)
            .await
            .map_err(|source| RelayError::Bind {
                endpoint: "source",
                addr: source_addr,
                source,
            })?;

        let listener_addr = config.listener_bind();
        let listeners = TcpListener::bind(&listener_addr)
            .await
            .map_err(|source| RelayError::Bind {
                endpoint: "listener",
                addr: listener_addr,
                source,
            })?;

        Ok(Self {
            relay,
            sources,
            listeners,
        })
    }

    pub fn source_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.sources.local_addr()?)
    }

    pub fn listener_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listeners.local_addr()?)
    }

    /// Accept connections until shutdown, then close all listener channels.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let source_addr = self.sources.local_addr().ok();
        let listener_addr = self.listeners.local_addr().ok();
        info!(sources = ?source_addr, listeners = ?listener_addr, "relay accepting connections");

        let mut stop = shutdown.clone();
        tokio::select! {
            _ = accept_sources(&self.sources, &self.relay, &shutdown) => {}
            _ = accept_listeners(&self.listeners, &self.relay) => {}
            _ = wait_for_shutdown(&mut stop) => {
                info!("shutdown signalled, closing listener channels");
            }
        }

        self.relay.shutdown();
    }
}

async fn accept_sources(
    listener: &TcpListener,
    relay: &Arc<Relay>,
    shutdown: &watch::Receiver<bool>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                let relay = Arc::clone(relay);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    relay.handle_source(stream, peer, shutdown).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept source connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn accept_listeners(listener: &TcpListener, relay: &Arc<Relay>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                let relay = Arc::clone(relay);
                tokio::spawn(async move {
                    relay.handle_listener(stream, peer).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept listener connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Bind everything described by `config` and run until shutdown.
pub async fn serve(config: Config, shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
    config.validate()?;

    let relay = Arc::new(Relay::new());
    let ready = Arc::new(AtomicBool::new(false));

    if let Some(addr) = config.health_addr {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Health { addr, source })?;
        let state = HealthState::new(Arc::clone(&relay), Arc::clone(&ready));
        let mut stop = shutdown.clone();
        info!(addr = %addr, "health/metrics server listening");
        tokio::spawn(async move {
            let app = create_router(state);
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { wait_for_shutdown(&mut stop).await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "health server failed");
            }
        });
    }

    let server = RelayServer::bind(&config, relay).await?;
    ready.store(true, Ordering::SeqCst);
    server.run(shutdown).await;
    Ok(())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sources: usize,
    pub listeners: usize,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct HealthState {
    pub relay: Arc<Relay>,
    pub ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(relay: Arc<Relay>, ready: Arc<AtomicBool>) -> Self {
        Self { relay, ready }
    }

    fn response(&self, status: &str) -> HealthResponse {
        HealthResponse {
            status: status.to_string(),
            sources: self.relay.sources().len(),
            listeners: self.relay.listeners().len(),
        }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(state.response("ok"))
}

/// Ready endpoint - returns 200 only once both relay endpoints are bound
async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(state.response("ready")))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(state.response("not_ready")),
        )
    }
}

async fn metrics(State(state): State<HealthState>) -> (StatusCode, String) {
    match state.relay.metrics().encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Create the health server router
pub fn create_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}
