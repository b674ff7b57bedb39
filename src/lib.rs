//! Multi-room WebSocket Chat Relay Library
//!
//! Clients connect over WebSocket, name a room in the handshake, and
//! exchange text lines with every other occupant of that room.
//!
//! # Features
//! - Fixed set of rooms created at startup
//! - Join/leave notices
//! - Room switching with `switch to <room>`
//! - `quit` to disconnect
//! - Slow readers are evicted instead of slowing down the room
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - Each room is an actor owning its member set (`room`)
//! - Each connection has a read pump and a write pump (`handler`)
//! - Rooms deliver into a bounded per-session mailbox (`mailbox`)
//! - The room registry is immutable after startup (`registry`)
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use room_relay::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = ChatServer::bind(&config).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ServerEvent};
pub use config::{ClientConfig, ServerConfig, SessionConfig};
pub use error::{AppError, EnqueueError};
pub use handler::{handle_connection, serve_session};
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use message::{ClientCommand, ServerFrame};
pub use registry::Registry;
pub use room::{RoomHandle, RoomState};
pub use server::ChatServer;
pub use session::{Session, SessionHandle};
pub use types::{RoomId, SessionId};
