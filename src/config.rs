//! Command line configuration
//!
//! Server and client settings are parsed with clap. Everything has a default,
//! so both binaries start with no arguments.

use std::time::Duration;

use clap::Parser;

use crate::error::AppError;
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default WebSocket endpoint for the client
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";

/// Room a client asks for when none is given
pub const DEFAULT_ROOM: &str = "1";

/// Multi-room WebSocket chat relay
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Rooms to open at startup (repeatable or comma-separated)
    #[arg(short, long = "room", value_delimiter = ',', default_values = ["1", "2"])]
    pub rooms: Vec<String>,

    /// Outbound messages buffered per client before it is disconnected
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    pub mailbox_capacity: usize,

    /// Disconnect clients that send nothing for this many seconds
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            rooms: vec!["1".to_string(), "2".to_string()],
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rooms.is_empty() {
            return Err(AppError::Config("at least one room is required".to_string()));
        }
        if self.rooms.iter().any(String::is_empty) {
            return Err(AppError::Config("room ids must not be empty".to_string()));
        }
        if self.mailbox_capacity == 0 {
            return Err(AppError::Config("mailbox capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Per-connection settings derived from this config
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            mailbox_capacity: self.mailbox_capacity,
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Settings every connection handler gets
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub mailbox_capacity: usize,
    /// `None` keeps idle connections forever
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session()
    }
}

/// Line-oriented client for the chat relay
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct ClientConfig {
    /// WebSocket endpoint of the relay
    #[arg(short, long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Display name (random if omitted)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Room to join
    #[arg(short, long, default_value = DEFAULT_ROOM)]
    pub room: String,
}

impl ClientConfig {
    /// The given name, or `anon<number>` when none was given
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("anon{}", rand::random::<u32>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::try_parse_from(["room-relay"]).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.rooms, ["1", "2"]);
        assert_eq!(config.mailbox_capacity, 256);
        assert!(config.session().idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_rooms_and_timeout() {
        let config = ServerConfig::try_parse_from([
            "room-relay",
            "--room",
            "lobby,games",
            "-r",
            "music",
            "--idle-timeout-secs",
            "30",
        ])
        .unwrap();
        assert_eq!(config.rooms, ["lobby", "games", "music"]);
        assert_eq!(config.session().idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let no_rooms = ServerConfig {
            rooms: Vec::new(),
            ..ServerConfig::default()
        };
        assert!(matches!(no_rooms.validate(), Err(AppError::Config(_))));

        let no_capacity = ServerConfig {
            mailbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(no_capacity.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_client_name_defaults_to_anon() {
        let config = ClientConfig::try_parse_from(["chat-client"]).unwrap();
        assert!(config.display_name().starts_with("anon"));
        assert_eq!(config.room, DEFAULT_ROOM);

        let named = ClientConfig::try_parse_from(["chat-client", "-n", "alice"]).unwrap();
        assert_eq!(named.display_name(), "alice");
    }
}
