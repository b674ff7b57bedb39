//! Session state
//!
//! A connected client is split in two: the [`SessionHandle`] that rooms keep
//! in their member sets, and the [`Session`] owned by the connection's read
//! side, which tracks the current room and issues membership changes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AppError, EnqueueError};
use crate::mailbox::MailboxSender;
use crate::message::chat_line;
use crate::registry::Registry;
use crate::room::RoomHandle;
use crate::types::{RoomId, SessionId};

/// What a room knows about one of its members
///
/// Cheap to clone. Two handles are the same member iff their ids match.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Display name from the handshake (not unique)
    pub name: String,
    mailbox: MailboxSender,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(name: impl Into<String>, mailbox: MailboxSender, shutdown: CancellationToken) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            mailbox,
            shutdown,
        }
    }

    /// Queue a line for this session's write pump without waiting
    pub fn try_enqueue(&self, line: String) -> Result<(), EnqueueError> {
        self.mailbox.try_enqueue(line)
    }

    /// Ask both pumps to stop and the transport to close
    ///
    /// Idempotent. Every current and future waiter on the token observes it.
    pub fn shut_down(&self) {
        self.shutdown.cancel();
    }

    /// Whether the session is on its way out and can no longer receive lines
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled() || self.mailbox.is_closed()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Read-side state of a connection
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    room: Option<RoomHandle>,
    registry: Arc<Registry>,
}

impl Session {
    /// Create a session that is not yet in any room
    pub fn new(handle: SessionHandle, registry: Arc<Registry>) -> Self {
        Self {
            handle,
            room: None,
            registry,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn current_room(&self) -> Option<&RoomId> {
        self.room.as_ref().map(RoomHandle::id)
    }

    /// Register with `room` and make it the current room
    pub async fn enter(&mut self, room: RoomHandle) -> Result<(), AppError> {
        // Recorded first so a teardown racing the handoff still unregisters
        self.room = Some(room.clone());
        room.register(self.handle.clone()).await
    }

    /// Unregister from the current room, if any
    pub async fn leave(&mut self) -> Result<(), AppError> {
        match self.room.take() {
            Some(room) => room.unregister(self.handle.clone()).await,
            None => Ok(()),
        }
    }

    /// Leave the current room, then join `target` if it exists
    ///
    /// An unknown target leaves the session in no room at all until the next
    /// successful switch.
    pub async fn switch_to(&mut self, target: &str) -> Result<(), AppError> {
        self.leave().await?;
        match self.registry.get(target).cloned() {
            Some(room) => self.enter(room).await,
            None => {
                debug!(
                    "Session {} asked for unknown room '{}', now in no room",
                    self.handle.id, target
                );
                Ok(())
            }
        }
    }

    /// Broadcast a chat line, attributed to this session, to the current room
    pub async fn say(&self, text: &str) -> Result<(), AppError> {
        match &self.room {
            Some(room) => room.broadcast(chat_line(&self.handle.name, text)).await,
            None => {
                debug!("Session {} is in no room, dropping line", self.handle.id);
                Ok(())
            }
        }
    }
}
