//! Client side of the line protocol
//!
//! A thin wrapper over one WebSocket connection that turns frames into
//! [`ServerEvent`]s. Used by the `chat-client` binary and the integration tests.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::AppError;
use crate::handler::{NAME_HEADER, ROOM_HEADER};
use crate::message::{LINE_SEPARATOR, QUIT_COMMAND, SWITCH_PREFIX};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the server sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Registered room ids (sent once, right after connecting)
    RoomList(Vec<String>),
    /// One batch of chat lines and notices
    Lines(Vec<String>),
    /// The server closed the connection
    Closed,
}

/// An open connection to the relay
pub struct ChatClient {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    room_list_seen: bool,
}

impl ChatClient {
    /// Connect as `name`, asking for `room`
    pub async fn connect(url: &str, name: &str, room: &str) -> Result<Self, AppError> {
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            NAME_HEADER,
            HeaderValue::from_str(name).map_err(|_| AppError::InvalidHeader(NAME_HEADER))?,
        );
        headers.insert(
            ROOM_HEADER,
            HeaderValue::from_str(room).map_err(|_| AppError::InvalidHeader(ROOM_HEADER))?,
        );

        let (ws_stream, _response) = connect_async(request).await?;
        let (sink, stream) = ws_stream.split();
        Ok(Self {
            sink,
            stream,
            room_list_seen: false,
        })
    }

    /// Send one raw line: chat, or a command
    pub async fn send_line(&mut self, line: &str) -> Result<(), AppError> {
        self.sink.send(Message::Text(line.to_string())).await?;
        Ok(())
    }

    pub async fn switch_to(&mut self, room: &str) -> Result<(), AppError> {
        self.send_line(&format!("{}{}", SWITCH_PREFIX, room)).await
    }

    /// Ask the server to disconnect us
    pub async fn quit(&mut self) -> Result<(), AppError> {
        self.send_line(QUIT_COMMAND).await
    }

    /// Wait for the next event
    ///
    /// The room list is only accepted once; any later binary frame is a
    /// protocol error.
    pub async fn next_event(&mut self) -> Result<ServerEvent, AppError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(ServerEvent::Closed),
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(ServerEvent::Closed)
                }
                Some(Err(e)) => return Err(e.into()),
            };

            match message {
                Message::Binary(_) if self.room_list_seen => {
                    return Err(AppError::UnexpectedFrame("binary"))
                }
                Message::Binary(data) => {
                    self.room_list_seen = true;
                    let rooms = String::from_utf8_lossy(&data)
                        .split(LINE_SEPARATOR)
                        .filter(|room| !room.is_empty())
                        .map(str::to_owned)
                        .collect();
                    return Ok(ServerEvent::RoomList(rooms));
                }
                Message::Text(text) => {
                    let lines = text.split(LINE_SEPARATOR).map(str::to_owned).collect();
                    return Ok(ServerEvent::Lines(lines));
                }
                Message::Close(_) => return Ok(ServerEvent::Closed),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Frame(_) => return Err(AppError::UnexpectedFrame("raw")),
            }
        }
    }
}
