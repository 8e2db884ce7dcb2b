//! telerelay-lib: Relay core
//!
//! Sources report over a binary channel, listeners read a live text feed.
//! This crate holds the shared registries and the per-connection services
//! that the binary wires to TCP endpoints.

pub mod config;
pub mod error;
pub mod ingest;
pub mod listeners;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod service;

pub use config::Config;
pub use error::RelayError;
pub use ingest::SessionSummary;
pub use listeners::{BroadcastReport, Delivery, ListenerRegistry};
pub use metrics::RelayMetrics;
pub use registry::{SourceRegistry, SourceSnapshot, SourceState};
pub use relay::Relay;
pub use server::{create_router, serve, HealthState, RelayServer};
