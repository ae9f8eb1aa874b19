//! The typed messages flowing into the engine and out to the connections of a hosting session.
//!
//! Control messages like shutdown travel as their own variants next to the payload, never as magic
//! strings inside it.

use crate::role_map::ConnectionId;
use protocol::{BOARD_CELLS, ClientMessage, ServerMessage};
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Requests of the local UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiRequest {
    /// Start a new game.
    Reset,
    /// Load the stored game.
    Resume,
    /// Play the indicated cell.
    Play(u8),
    /// Ask for a fresh settings notification.
    UpdateSettings,
    StartServer,
    StartLocal,
    /// Connect to a host, either `host` or `host:port`.
    ConnectRemote(String),
    /// Shut the engine down.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UiParseError {
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("play needs a cell between 0 and 8, got {0:?}")]
    InvalidCell(String),
    #[error("connect-remote needs an address")]
    MissingAddress,
}

impl FromStr for UiRequest {
    type Err = UiParseError;

    /// Parses the textual commands, e.g. `play:4` or `connect-remote:192.168.0.4`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (command, argument) = match text.split_once(':') {
            Some((command, argument)) => (command, Some(argument.trim())),
            None => (text, None),
        };
        match (command.to_ascii_lowercase().as_str(), argument) {
            ("reset", None) => Ok(UiRequest::Reset),
            ("resume", None) => Ok(UiRequest::Resume),
            ("update-settings", None) => Ok(UiRequest::UpdateSettings),
            ("start-server", None) => Ok(UiRequest::StartServer),
            ("start-local", None) => Ok(UiRequest::StartLocal),
            ("stop", None) => Ok(UiRequest::Stop),
            ("play", Some(cell)) => cell
                .parse::<u8>()
                .ok()
                .filter(|cell| (*cell as usize) < BOARD_CELLS)
                .map(UiRequest::Play)
                .ok_or_else(|| UiParseError::InvalidCell(cell.to_string())),
            ("connect-remote", Some(address)) if !address.is_empty() => {
                Ok(UiRequest::ConnectRemote(address.to_string()))
            }
            ("connect-remote", _) => Err(UiParseError::MissingAddress),
            _ => Err(UiParseError::Unknown(text.to_string())),
        }
    }
}

/// What goes out on one connection of the hosting session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A regular message.
    Line(ServerMessage),
    /// Tell the client we are closing, then close.
    Shutdown,
    /// Close without any further word, the client is gone already.
    Abandoned,
}

/// The way back to the connection a request came from.
#[derive(Clone, Debug)]
pub struct ReplyHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
}

impl ReplyHandle {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Outbound>) -> ReplyHandle {
        ReplyHandle { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message for the connection without waiting. Returns false if it got dropped.
    pub fn send(&self, outbound: Outbound) -> bool {
        match self.sender.try_send(outbound) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection = %self.id, "Outbound queue full, message dropped.");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection = %self.id, "Connection already closed.");
                false
            }
        }
    }
}

/// The content of a request read off a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteRequest {
    Message(ClientMessage),
    /// The line could not be parsed, it gets echoed back as `invalid:<line>`.
    Invalid(String),
}

/// A request for the engine in the client protocol. Requests read off a connection carry the way back,
/// requests coming from within the process have none.
#[derive(Clone, Debug)]
pub struct ClientRequest {
    pub request: RemoteRequest,
    pub reply: Option<ReplyHandle>,
}
