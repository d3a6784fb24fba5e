//! Flashes signaling server binary.
//!
//! `FLASHES_ADDR` overrides the default bind address.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flashes_server::{ServerConfig, SignalServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("FLASHES_ADDR") {
        config.bind_addr = addr
            .parse()
            .with_context(|| format!("FLASHES_ADDR {addr:?} is not a socket address"))?;
    }

    info!("flashes signaling server v{}", env!("CARGO_PKG_VERSION"));
    let server = SignalServer::bind(&config)
        .await
        .context("could not bind the signaling socket")?;
    server.run().await?;
    Ok(())
}
