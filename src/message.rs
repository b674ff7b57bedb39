//! Line protocol definitions
//!
//! Client → server traffic is one raw text line per frame, interpreted as a
//! command or as chat. Server → client traffic is a one-off room list
//! (binary frame) followed by text frames carrying newline-joined lines.

use tokio_tungstenite::tungstenite::Message;

/// Disconnect command
pub const QUIT_COMMAND: &str = "quit";

/// Prefix of the room change command
pub const SWITCH_PREFIX: &str = "switch to ";

/// Sent once to a client asking for an unknown room at connect time
pub const INVALID_ROOM_NOTICE: &str = "Not a valid Room!";

/// Separator between lines inside one frame
pub const LINE_SEPARATOR: &str = "\n";

/// Client → Server line, classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand<'a> {
    /// Leave and disconnect
    Quit,
    /// Move to another room
    SwitchTo(&'a str),
    /// Anything else is broadcast to the current room
    Chat(&'a str),
}

impl<'a> ClientCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line == QUIT_COMMAND {
            return Self::Quit;
        }
        match line.strip_prefix(SWITCH_PREFIX) {
            Some(target) if !target.is_empty() => Self::SwitchTo(target),
            _ => Self::Chat(line),
        }
    }
}

/// Server → Client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// All registered room ids, newline-joined
    RoomList(String),
    /// Backlog drained from a mailbox
    Batch(Vec<String>),
    /// Unknown room at connect time
    Rejection,
}

impl ServerFrame {
    pub fn into_message(self) -> Message {
        match self {
            ServerFrame::RoomList(rooms) => Message::Binary(rooms.into_bytes()),
            ServerFrame::Batch(lines) => Message::Text(lines.join(LINE_SEPARATOR)),
            ServerFrame::Rejection => Message::Text(INVALID_ROOM_NOTICE.to_string()),
        }
    }
}

/// Chat line as delivered to room members
pub fn chat_line(sender: &str, text: &str) -> String {
    format!("{}: {}", sender, text)
}

pub fn joined_notice(name: &str, room: &str) -> String {
    format!("{} has joined room {}", name, room)
}

pub fn left_notice(name: &str) -> String {
    format!("{} has left the room!", name)
}
