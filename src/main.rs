//! Group relay server - Entry Point
//!
//! Binds the listener and serves connections until Ctrl-C.

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use group_relay::{serve, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=group_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("group_relay=info")),
        )
        .init();

    let config = ServerConfig::from_env();

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;

    serve(listener, config.command_buffer, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    info!("Server stopped");
    Ok(())
}
