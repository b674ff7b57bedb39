//! Bounded per-session outbound mailbox
//!
//! The room actor is the producer and the session's write pump is the only
//! consumer. Producers never block: a full mailbox is reported back as
//! [`EnqueueError::Full`] and the room decides what to do about it.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::EnqueueError;

/// Default number of messages a mailbox can hold
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Create a mailbox pair with the given capacity (at least 1)
pub fn mailbox(capacity: usize) -> (MailboxSender, MailboxReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (MailboxSender { tx }, MailboxReceiver { rx, capacity })
}

/// Producer side, cloned into every room the session joins
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<String>,
}

impl MailboxSender {
    /// Append a message without waiting
    pub fn try_enqueue(&self, msg: String) -> Result<(), EnqueueError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the write pump
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::Receiver<String>,
    capacity: usize,
}

impl MailboxReceiver {
    /// Wait for at least one message, then take the whole backlog in FIFO order.
    ///
    /// Returns `None` once every sender is dropped and the mailbox is empty.
    /// Cancel safe: nothing is lost if the future is dropped before completion.
    pub async fn drain_all(&mut self) -> Option<Vec<String>> {
        let mut batch = Vec::new();
        // The buffer never holds more than `capacity`, so one call empties it.
        if self.rx.recv_many(&mut batch, self.capacity).await == 0 {
            return None;
        }
        Some(batch)
    }

    /// Refuse further messages; producers see [`EnqueueError::Closed`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}
