//! WebSocket connection handler
//!
//! Handles individual client connections: handshake, room lookup, and the
//! read/write pump pair. The write pump is the only task that writes to the
//! socket; the read pump is the only one that reads from it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::AppError;
use crate::mailbox::{mailbox, MailboxReceiver};
use crate::message::{ClientCommand, ServerFrame};
use crate::registry::Registry;
use crate::room::RoomHandle;
use crate::session::{Session, SessionHandle};
use crate::types::SessionId;

/// Handshake header carrying the display name
pub const NAME_HEADER: &str = "name";

/// Handshake header carrying the requested room id
pub const ROOM_HEADER: &str = "room";

/// How long a rejected connection waits for the client's close reply
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// How long a stopping write pump may spend closing the socket
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Identification fields from the upgrade request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub name: String,
    pub room: String,
}

impl Handshake {
    /// Read both headers; missing or non-UTF-8 values become empty strings
    pub fn from_request(request: &Request) -> Self {
        let header = |key: &str| {
            request
                .headers()
                .get(key)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            name: header(NAME_HEADER),
            room: header(ROOM_HEADER),
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, rejects unknown rooms, and otherwise
/// hands the socket halves to [`serve_session`].
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<Registry>,
    config: SessionConfig,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let mut handshake = Handshake::default();
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            handshake = Handshake::from_request(request);
            Ok(response)
        },
    )
    .await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some(room) = registry.get(&handshake.room).cloned() else {
        warn!(
            "Rejecting '{}' from {}: unknown room '{}'",
            handshake.name, peer_addr, handshake.room
        );
        ws_sender.send(ServerFrame::Rejection.into_message()).await?;
        let _ = ws_sender.close().await;
        let linger = async { while let Some(Ok(_)) = ws_receiver.next().await {} };
        let _ = tokio::time::timeout(REJECT_LINGER, linger).await;
        return Ok(());
    };

    let (mailbox_tx, mailbox_rx) = mailbox(config.mailbox_capacity);
    let handle = SessionHandle::new(handshake.name, mailbox_tx, CancellationToken::new());
    let session_id = handle.id;
    info!(
        "Session {} ({}) connected from {} to room {}",
        session_id, handle.name, peer_addr, room.id()
    );

    let session = Session::new(handle, Arc::clone(&registry));
    serve_session(
        session,
        room,
        ws_receiver,
        ws_sender,
        mailbox_rx,
        config.idle_timeout,
    )
    .await;

    info!("Session {} disconnected", session_id);

    Ok(())
}

/// Run one session from registration to teardown
///
/// The write pump runs as its own task; the read pump runs here, raced
/// against the session's shutdown token. The token is cancelled by the room
/// on eviction, by the write pump when it stops, and here when the read pump
/// stops. Whatever ends the session, it is unregistered and the write pump
/// is joined before this returns.
pub async fn serve_session<R, W>(
    mut session: Session,
    room: RoomHandle,
    frames: R,
    sink: W,
    mailbox: MailboxReceiver,
    idle_timeout: Option<Duration>,
) where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    let session_id = session.id();
    let shutdown = session.handle().shutdown_token();

    let write_task = tokio::spawn(write_pump(
        session_id,
        sink,
        mailbox,
        shutdown.clone(),
        session.registry().room_list(),
    ));

    let reading = async {
        session.enter(room).await?;
        read_pump(&mut session, frames, idle_timeout).await
    };

    tokio::select! {
        result = reading => match result {
            Ok(()) => debug!("Read pump ended for {}", session_id),
            Err(e) => debug!("Read pump failed for {}: {}", session_id, e),
        },
        _ = shutdown.cancelled() => {
            debug!("Session {} shut down, dropping read pump", session_id);
        }
    }

    // A register dropped mid-handoff is skipped by the room once the token
    // is cancelled, so this cannot be overtaken by a stale registration.
    if let Err(e) = session.leave().await {
        warn!("Failed to unregister {}: {}", session_id, e);
    }
    shutdown.cancel();

    match write_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Write pump failed for {}: {}", session_id, e),
        Err(e) => error!("Write pump for {} panicked: {}", session_id, e),
    }
}

/// Consume inbound frames until quit, close, or a fatal error
///
/// Membership changes and broadcasts are submitted through `session`. The
/// caller unregisters the session once this returns, whatever the outcome.
pub async fn read_pump<S>(
    session: &mut Session,
    mut frames: S,
    idle_timeout: Option<Duration>,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let Some(frame) = next_frame(&mut frames, idle_timeout).await? else {
            debug!("Session {} stream ended", session.id());
            return Ok(());
        };

        match frame {
            Message::Text(text) => match ClientCommand::parse(&text) {
                ClientCommand::Quit => {
                    info!("Session {} quit", session.id());
                    return Ok(());
                }
                ClientCommand::SwitchTo(target) => {
                    info!("Session {} switching to room '{}'", session.id(), target);
                    session.switch_to(target).await?;
                }
                ClientCommand::Chat(line) => {
                    debug!("Session {} says: {}", session.id(), line);
                    session.say(line).await?;
                }
            },
            Message::Close(_) => {
                debug!("Session {} sent close frame", session.id());
                return Ok(());
            }
            // Answered by tungstenite itself
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => return Err(AppError::UnexpectedFrame("binary")),
            Message::Frame(_) => return Err(AppError::UnexpectedFrame("raw")),
        }
    }
}

async fn next_frame<S>(
    frames: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<Option<Message>, AppError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.next())
            .await
            .map_err(|_| AppError::IdleTimeout)?,
        None => frames.next().await,
    };
    Ok(next.transpose()?)
}

/// Sole writer of the socket
///
/// Sends the room list first, then one text frame per drained mailbox
/// backlog. Every wait, a blocked send included, is cut short by the
/// shutdown token. On the way out the token is cancelled, the mailbox is
/// closed, and the socket gets at most `CLOSE_TIMEOUT` to close.
pub async fn write_pump<S>(
    session_id: SessionId,
    mut sink: S,
    mut mailbox: MailboxReceiver,
    shutdown: CancellationToken,
    room_list: String,
) -> Result<(), AppError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let result = tokio::select! {
        result = pump_frames(&mut sink, &mut mailbox, room_list) => result,
        _ = shutdown.cancelled() => {
            debug!("Write pump for {} told to shut down", session_id);
            Ok(())
        }
    };

    shutdown.cancel();
    mailbox.close();
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("Closing the socket for {} timed out", session_id);
    }
    debug!("Write pump ended for {}", session_id);
    result
}

async fn pump_frames<S>(
    sink: &mut S,
    mailbox: &mut MailboxReceiver,
    room_list: String,
) -> Result<(), AppError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    sink.send(ServerFrame::RoomList(room_list).into_message()).await?;
    while let Some(batch) = mailbox.drain_all().await {
        sink.send(ServerFrame::Batch(batch).into_message()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::stream;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use super::*;
    use crate::error::EnqueueError;

    const WAIT: Duration = Duration::from_secs(2);

    /// Accepts a fixed number of frames, then either fails or hangs forever
    struct TestSink {
        accepts: usize,
        stall: bool,
    }

    impl TestSink {
        fn accepting() -> Self {
            Self { accepts: usize::MAX, stall: false }
        }

        fn failing_after(accepts: usize) -> Self {
            Self { accepts, stall: false }
        }

        fn stalled_after(accepts: usize) -> Self {
            Self { accepts, stall: true }
        }
    }

    impl Sink<Message> for TestSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            if self.accepts > 0 {
                Poll::Ready(Ok(()))
            } else if self.stall {
                Poll::Pending
            } else {
                Poll::Ready(Err(WsError::ConnectionClosed))
            }
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), WsError> {
            self.get_mut().accepts -= 1;
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            if self.stall {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            }
        }
    }

    fn silent() -> Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>> {
        Box::pin(stream::pending())
    }

    fn open(name: &str, capacity: usize, registry: &Arc<Registry>) -> (Session, MailboxReceiver) {
        let (tx, rx) = mailbox(capacity);
        let handle = SessionHandle::new(name, tx, CancellationToken::new());
        (Session::new(handle, Arc::clone(registry)), rx)
    }

    /// Register a plain listener in `room` and wait for its join notice
    async fn listener(room: &RoomHandle, name: &str) -> (SessionHandle, MailboxReceiver) {
        let (tx, mut rx) = mailbox(64);
        let handle = SessionHandle::new(name, tx, CancellationToken::new());
        room.register(handle.clone()).await.unwrap();
        rx.drain_all().await.unwrap();
        (handle, rx)
    }

    /// Collect lines until `wanted` arrives
    async fn wait_for(rx: &mut MailboxReceiver, wanted: &str) -> Vec<String> {
        let mut seen = Vec::new();
        while !seen.iter().any(|line: &String| line == wanted) {
            let batch = tokio::time::timeout(WAIT, rx.drain_all())
                .await
                .unwrap_or_else(|_| panic!("no '{}' after {:?}", wanted, seen))
                .unwrap();
            seen.extend(batch);
        }
        seen
    }

    #[test]
    fn test_handshake_headers() {
        let mut request = "ws://localhost/ws".into_client_request().unwrap();
        request
            .headers_mut()
            .insert(NAME_HEADER, HeaderValue::from_static("alice"));
        request
            .headers_mut()
            .insert(ROOM_HEADER, HeaderValue::from_static("2"));

        let handshake = Handshake::from_request(&request);
        assert_eq!(handshake.name, "alice");
        assert_eq!(handshake.room, "2");
    }

    #[test]
    fn test_handshake_missing_headers() {
        let request = "ws://localhost/ws".into_client_request().unwrap();
        assert_eq!(Handshake::from_request(&request), Handshake::default());
    }

    #[tokio::test]
    async fn test_write_pump_stops_on_shutdown_while_send_is_stuck() {
        let (tx, rx) = mailbox(4);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(write_pump(
            SessionId::new(),
            TestSink::stalled_after(1),
            rx,
            shutdown.clone(),
            "1".to_string(),
        ));
        tx.try_enqueue("never delivered".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();

        let finished = tokio::time::timeout(WAIT, pump).await;
        assert!(finished.is_ok(), "write pump still blocked after shutdown");
        assert_eq!(tx.try_enqueue("late".to_string()), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    async fn test_write_pump_failure_cancels_session() {
        let (tx, rx) = mailbox(4);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(write_pump(
            SessionId::new(),
            TestSink::failing_after(1),
            rx,
            shutdown.clone(),
            "1".to_string(),
        ));
        tx.try_enqueue("hello".to_string()).unwrap();

        let result = tokio::time::timeout(WAIT, pump).await.unwrap().unwrap();
        assert!(matches!(result, Err(AppError::WebSocket(WsError::ConnectionClosed))));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_binary_frame_is_rejected() {
        let registry = Arc::new(Registry::spawn(["1"]));
        let (mut alice, _rx) = open("alice", 8, &registry);
        alice.enter(registry.get("1").cloned().unwrap()).await.unwrap();
        let frames = stream::iter(vec![
            Ok(Message::Text("hello".to_string())),
            Ok(Message::Binary(vec![1, 2, 3])),
            Ok(Message::Text("never read".to_string())),
        ]);

        let result = read_pump(&mut alice, frames, None).await;

        assert!(matches!(result, Err(AppError::UnexpectedFrame("binary"))));
    }

    #[tokio::test]
    async fn test_binary_frame_ends_session_and_unregisters() {
        let registry = Arc::new(Registry::spawn(["1"]));
        let room = registry.get("1").cloned().unwrap();
        let (bob, mut bob_rx) = listener(&room, "bob").await;
        let (alice, alice_rx) = open("alice", 8, &registry);
        let frames = stream::iter(vec![
            Ok(Message::Text("hello".to_string())),
            Ok(Message::Binary(vec![1, 2, 3])),
            Ok(Message::Text("never read".to_string())),
        ]);

        let served = serve_session(alice, room.clone(), frames, TestSink::accepting(), alice_rx, None);
        tokio::time::timeout(WAIT, served).await.unwrap();

        assert_eq!(room.members().await.unwrap(), vec![bob.id]);
        let seen = wait_for(&mut bob_rx, "alice has left the room!").await;
        assert_eq!(seen[0], "alice has joined room 1");
        assert!(!seen.iter().any(|line| line.contains("never read")));
    }

    #[tokio::test]
    async fn test_write_failure_unregisters_session() {
        let registry = Arc::new(Registry::spawn(["1"]));
        let room = registry.get("1").cloned().unwrap();
        let (bob, mut bob_rx) = listener(&room, "bob").await;
        let (alice, alice_rx) = open("alice", 8, &registry);

        // The room list goes out, the first batch (alice's join notice) fails
        let served = serve_session(
            alice,
            room.clone(),
            silent(),
            TestSink::failing_after(1),
            alice_rx,
            None,
        );
        tokio::time::timeout(WAIT, served).await.unwrap();

        assert_eq!(room.members().await.unwrap(), vec![bob.id]);
        wait_for(&mut bob_rx, "alice has left the room!").await;
    }

    #[tokio::test]
    async fn test_stalled_session_is_evicted_and_torn_down() {
        let registry = Arc::new(Registry::spawn(["1"]));
        let room = registry.get("1").cloned().unwrap();
        let (bob, mut bob_rx) = listener(&room, "bob").await;
        let (alice, alice_rx) = open("alice", 2, &registry);

        let served = tokio::spawn(serve_session(
            alice,
            room.clone(),
            silent(),
            TestSink::stalled_after(1),
            alice_rx,
            None,
        ));
        wait_for(&mut bob_rx, "alice has joined room 1").await;

        for n in 0..4 {
            room.broadcast(format!("bob: {}", n)).await.unwrap();
        }

        wait_for(&mut bob_rx, "alice has left the room!").await;
        assert_eq!(room.members().await.unwrap(), vec![bob.id]);
        let finished = tokio::time::timeout(WAIT, served).await;
        assert!(finished.is_ok(), "evicted session was never torn down");
    }
}
