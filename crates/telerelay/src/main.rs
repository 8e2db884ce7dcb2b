//! telerelay: Telemetry relay binary
//!
//! Sources push status frames on one port, listeners read a live text feed
//! on another.

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use telerelay_lib::{serve, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("telerelay=info,telerelay_lib=info"));
    if config.log_json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }

    info!(
        source = %config.source_bind(),
        listener = %config.listener_bind(),
        health = ?config.health_addr,
        "telerelay starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    serve(config, shutdown_rx).await?;

    info!("telerelay stopped");
    Ok(())
}
