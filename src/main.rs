//! Multi-room WebSocket chat relay - Entry Point
//!
//! Parses the configuration, starts the room actors and accepts connections.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use room_relay::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_relay=info")),
        )
        .init();

    let config = ServerConfig::parse();
    let server = ChatServer::bind(&config).await?;

    info!(
        "WebSocket chat relay listening on {} with rooms {:?}",
        server.local_addr()?,
        config.rooms
    );

    server.run().await;

    Ok(())
}
