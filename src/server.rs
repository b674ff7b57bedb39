//! Relay server
//!
//! Owns the listener and the room registry, and supervises one task per
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::{ServerConfig, SessionConfig};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// The listening relay
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    session: SessionConfig,
}

impl ChatServer {
    /// Validate the config, bind the listener and start every room actor
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.addr).await?;
        let registry = Arc::new(Registry::spawn(config.rooms.iter().cloned()));
        Ok(Self {
            listener,
            registry,
            session: config.session(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections forever
    ///
    /// Connection tasks live in a `JoinSet`; finished ones are reaped as the
    /// loop goes so the set only holds live sessions.
    pub async fn run(self) {
        info!("ChatServer accepting connections");

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let registry = Arc::clone(&self.registry);
                        let config = self.session;
                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, config).await {
                                error!("Connection handler error for {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task panicked: {}", e);
                    }
                    debug!("Live connections: {}", sessions.len());
                }
            }
        }
    }
}
