//! Error types for the relay
//!
//! Defines session-level errors and the mailbox enqueue error.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::RoomId;

/// Application-level errors
///
/// Every variant is scoped to a single session (or to startup): none of
/// them is ever propagated into a room actor.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or transport error (fatal to the session)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The room actor's inbox is gone
    #[error("Room {0} is no longer accepting events")]
    RoomClosed(RoomId),

    /// A frame of a kind this side never expects
    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    /// No inbound frame within the configured idle timeout
    #[error("Connection idle for too long")]
    IdleTimeout,

    /// A handshake header could not be encoded
    #[error("Invalid header value for '{0}'")]
    InvalidHeader(&'static str),

    /// Startup configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Mailbox enqueue errors
///
/// Returned instead of blocking, so a stalled consumer never stalls the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The mailbox is at capacity
    #[error("Mailbox full")]
    Full,

    /// The consumer (write pump) has gone away
    #[error("Mailbox closed")]
    Closed,
}
