//! Room actor implementation
//!
//! Each room runs its own single-consumer event loop that owns the member
//! set. Sessions talk to it only through a [`RoomHandle`]: registration and
//! unregistration are acknowledged handoffs, broadcasts are buffered.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AppError, EnqueueError};
use crate::message::{joined_notice, left_notice};
use crate::session::SessionHandle;
use crate::types::{RoomId, SessionId};

/// Broadcast inbox buffer size
pub const BROADCAST_INBOX_CAPACITY: usize = 256;

/// A membership change waiting for the actor, acknowledged once applied
#[derive(Debug)]
struct Membership {
    session: SessionHandle,
    applied: oneshot::Sender<()>,
}

/// Authoritative member set of one room and its delivery policy
///
/// Only ever touched from inside the room's actor loop (or directly in tests).
#[derive(Debug)]
pub struct RoomState {
    id: RoomId,
    members: HashMap<SessionId, SessionHandle>,
}

impl RoomState {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashMap::new(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains_key(&session_id)
    }

    pub fn member_ids(&self) -> Vec<SessionId> {
        self.members.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member and announce it to everyone, newcomer included
    ///
    /// A session that is already shut down is not added; its connection is
    /// tearing down and would only produce a joined/left pair.
    pub fn register(&mut self, session: SessionHandle) {
        if session.is_shut_down() {
            debug!("Not registering {} ({}) in room {}: shut down", session.name, session.id, self.id);
            return;
        }
        info!("{} joined room {}", session.name, self.id);
        let notice = joined_notice(&session.name, self.id.as_str());
        self.members.insert(session.id, session);
        self.broadcast(notice);
    }

    /// Remove a member and announce it to the rest; no-op for non-members
    pub fn unregister(&mut self, session_id: SessionId) {
        if let Some(notice) = self.remove(session_id) {
            self.broadcast(notice);
        }
    }

    /// Deliver a line to every member, evicting members that cannot keep up
    ///
    /// Evictions produce leave notices, which are delivered the same way and
    /// may evict further members.
    pub fn broadcast(&mut self, line: String) {
        let mut pending = VecDeque::from([line]);
        while let Some(line) = pending.pop_front() {
            for session_id in self.fan_out(&line) {
                if let Some(session) = self.members.get(&session_id) {
                    session.shut_down();
                }
                if let Some(notice) = self.remove(session_id) {
                    pending.push_back(notice);
                }
            }
        }
    }

    /// Try to enqueue `line` into every member's mailbox.
    ///
    /// Never waits and never retries. Returns the members whose mailbox
    /// refused the line; they must be unregistered.
    pub fn fan_out(&self, line: &str) -> Vec<SessionId> {
        let mut overflowed = Vec::new();
        for (id, session) in &self.members {
            match session.try_enqueue(line.to_string()) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    warn!("Evicting {} ({}) from room {}: mailbox full", session.name, id, self.id);
                    overflowed.push(*id);
                }
                Err(EnqueueError::Closed) => {
                    debug!("Evicting {} ({}) from room {}: mailbox closed", session.name, id, self.id);
                    overflowed.push(*id);
                }
            }
        }
        overflowed
    }

    /// Drop a member, returning the leave notice if it was one
    fn remove(&mut self, session_id: SessionId) -> Option<String> {
        let session = self.members.remove(&session_id)?;
        info!("{} left room {}", session.name, self.id);
        Some(left_notice(&session.name))
    }
}

/// Cloneable sending side of a room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    register_tx: mpsc::Sender<Membership>,
    unregister_tx: mpsc::Sender<Membership>,
    broadcast_tx: mpsc::Sender<String>,
    query_tx: mpsc::Sender<oneshot::Sender<Vec<SessionId>>>,
}

impl RoomHandle {
    /// Start a room actor on the current runtime
    pub fn spawn(id: RoomId) -> Self {
        let (handle, actor) = RoomActor::new(id);
        tokio::spawn(actor.run());
        handle
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Add a session; returns once the room has applied it
    pub async fn register(&self, session: SessionHandle) -> Result<(), AppError> {
        self.hand_off(&self.register_tx, session).await
    }

    /// Remove a session; returns once the room has applied it
    pub async fn unregister(&self, session: SessionHandle) -> Result<(), AppError> {
        self.hand_off(&self.unregister_tx, session).await
    }

    pub async fn broadcast(&self, line: String) -> Result<(), AppError> {
        self.broadcast_tx
            .send(line)
            .await
            .map_err(|_| self.closed())
    }

    /// Snapshot of the current member ids
    pub async fn members(&self) -> Result<Vec<SessionId>, AppError> {
        let (reply, snapshot) = oneshot::channel();
        self.query_tx.send(reply).await.map_err(|_| self.closed())?;
        snapshot.await.map_err(|_| self.closed())
    }

    async fn hand_off(
        &self,
        inbox: &mpsc::Sender<Membership>,
        session: SessionHandle,
    ) -> Result<(), AppError> {
        let (applied, done) = oneshot::channel();
        inbox
            .send(Membership { session, applied })
            .await
            .map_err(|_| self.closed())?;
        done.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        AppError::RoomClosed(self.id.clone())
    }
}

/// The room's event loop
pub struct RoomActor {
    state: RoomState,
    register_rx: mpsc::Receiver<Membership>,
    unregister_rx: mpsc::Receiver<Membership>,
    broadcast_rx: mpsc::Receiver<String>,
    query_rx: mpsc::Receiver<oneshot::Sender<Vec<SessionId>>>,
}

impl RoomActor {
    pub fn new(id: RoomId) -> (RoomHandle, RoomActor) {
        let (register_tx, register_rx) = mpsc::channel(1);
        let (unregister_tx, unregister_rx) = mpsc::channel(1);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_INBOX_CAPACITY);
        let (query_tx, query_rx) = mpsc::channel(1);

        let handle = RoomHandle {
            id: id.clone(),
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
        };
        let actor = RoomActor {
            state: RoomState::new(id),
            register_rx,
            unregister_rx,
            broadcast_rx,
            query_rx,
        };
        (handle, actor)
    }

    /// Run until every handle is dropped
    ///
    /// Each iteration services exactly one ready event. When several inboxes
    /// are ready at once the choice between them is random: events of
    /// different kinds carry no relative ordering, only events within one
    /// inbox do.
    pub async fn run(mut self) {
        info!("Room {} started", self.state.id());

        loop {
            tokio::select! {
                Some(Membership { session, applied }) = self.unregister_rx.recv() => {
                    self.state.unregister(session.id);
                    let _ = applied.send(());
                }
                Some(Membership { session, applied }) = self.register_rx.recv() => {
                    self.state.register(session);
                    let _ = applied.send(());
                }
                Some(line) = self.broadcast_rx.recv() => {
                    self.state.broadcast(line);
                }
                Some(reply) = self.query_rx.recv() => {
                    let _ = reply.send(self.state.member_ids());
                }
                else => break,
            }
            debug!("Room {} has {} members", self.state.id(), self.state.len());
        }

        info!("Room {} shutting down", self.state.id());
    }
}
