//! The line based messages exchanged between a hosting engine and its remote clients.
//! Every message is one line of UTF-8 text terminated by `\n`.
//!
//! Client -> Server:
//! * `initialize`: Asks for a role. `initialise` is accepted as a spelling variant.
//! * `p:<d>`: Plays cell `d` (0..=8) with the role of this connection.
//! * `status:`: Asks for the current state.
//! * `shutdown` / `abandoned`: The client leaves and frees its role.
//!
//! Server -> Client:
//! * `Player=<X|O>`: The role assigned to the connection.
//! * `s:<encoded state>`: The current state, see [`crate::codec`].
//! * `invalid:<line>`: The line could not be understood.
//! * `shutdown`: The host closes the session.

use crate::board::{BOARD_CELLS, GameState, Player};
use crate::codec::{self, FormatError};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

const PLAY_PREFIX: &str = "p:";
const STATE_PREFIX: &str = "s:";
const ROLE_PREFIX: &str = "Player=";
const INVALID_PREFIX: &str = "invalid:";
const SHUTDOWN: &str = "shutdown";
const ABANDONED: &str = "abandoned";

/// Errors we get when a line does not match any known message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown message {0:?}")]
    Unknown(String),
    #[error("invalid cell in play message {0:?}")]
    InvalidCell(String),
    #[error("invalid role in role message {0:?}")]
    InvalidRole(String),
    #[error("invalid state: {0}")]
    InvalidState(#[from] FormatError),
}

/// Requests a remote client can send to the hosting engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Initialize,
    Play(u8),
    Status,
    Shutdown,
    Abandoned,
}

impl Display for ClientMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientMessage::Initialize => write!(f, "initialize"),
            ClientMessage::Play(index) => write!(f, "{PLAY_PREFIX}{index}"),
            ClientMessage::Status => write!(f, "status:"),
            ClientMessage::Shutdown => write!(f, "{SHUTDOWN}"),
            ClientMessage::Abandoned => write!(f, "{ABANDONED}"),
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let lowered = line.to_ascii_lowercase();
        match lowered.as_str() {
            "initialize" | "initialise" => return Ok(ClientMessage::Initialize),
            "status:" | "status" => return Ok(ClientMessage::Status),
            SHUTDOWN => return Ok(ClientMessage::Shutdown),
            ABANDONED => return Ok(ClientMessage::Abandoned),
            _ => {}
        }
        if let Some(cell) = lowered.strip_prefix(PLAY_PREFIX) {
            return parse_cell(cell)
                .map(ClientMessage::Play)
                .ok_or_else(|| ParseError::InvalidCell(line.to_string()));
        }
        Err(ParseError::Unknown(line.to_string()))
    }
}

/// A cell index is exactly one digit below [`BOARD_CELLS`].
fn parse_cell(text: &str) -> Option<u8> {
    let mut chars = text.chars();
    let digit = chars.next()?.to_digit(10)?;
    if chars.next().is_some() || digit as usize >= BOARD_CELLS {
        return None;
    }
    Some(digit as u8)
}

/// Messages the hosting engine sends to a remote client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    RoleAssigned(Player),
    State(GameState),
    Invalid(String),
    Shutdown,
}

impl Display for ServerMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerMessage::RoleAssigned(player) => write!(f, "{ROLE_PREFIX}{player}"),
            ServerMessage::State(state) => {
                write!(f, "{STATE_PREFIX}{}", codec::encode_state(state))
            }
            ServerMessage::Invalid(text) => write!(f, "{INVALID_PREFIX}{text}"),
            ServerMessage::Shutdown => write!(f, "{SHUTDOWN}"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(encoded) = line.strip_prefix(STATE_PREFIX) {
            return Ok(ServerMessage::State(codec::decode(encoded)?));
        }
        if let Some(role) = line.strip_prefix(ROLE_PREFIX) {
            let mut chars = role.chars();
            return match (chars.next().and_then(Player::from_token), chars.next()) {
                (Some(player), None) => Ok(ServerMessage::RoleAssigned(player)),
                _ => Err(ParseError::InvalidRole(line.to_string())),
            };
        }
        if let Some(text) = line.strip_prefix(INVALID_PREFIX) {
            return Ok(ServerMessage::Invalid(text.to_string()));
        }
        if line.eq_ignore_ascii_case(SHUTDOWN) {
            return Ok(ServerMessage::Shutdown);
        }
        Err(ParseError::Unknown(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GameBoard;

    #[test]
    fn client_messages_parse_with_variants() {
        assert_eq!("initialize".parse(), Ok(ClientMessage::Initialize));
        assert_eq!("Initialise".parse(), Ok(ClientMessage::Initialize));
        assert_eq!("p:4".parse(), Ok(ClientMessage::Play(4)));
        assert_eq!("P:0\r".parse(), Ok(ClientMessage::Play(0)));
        assert_eq!("status:".parse(), Ok(ClientMessage::Status));
        assert_eq!("status".parse(), Ok(ClientMessage::Status));
        assert_eq!("shutdown".parse(), Ok(ClientMessage::Shutdown));
        assert_eq!("abandoned".parse(), Ok(ClientMessage::Abandoned));
    }

    #[test]
    fn client_play_rejects_bad_cells() {
        assert_eq!(
            "p:9".parse::<ClientMessage>(),
            Err(ParseError::InvalidCell("p:9".to_string()))
        );
        assert!("p:".parse::<ClientMessage>().is_err());
        assert!("p:12".parse::<ClientMessage>().is_err());
        assert_eq!(
            "hello".parse::<ClientMessage>(),
            Err(ParseError::Unknown("hello".to_string()))
        );
    }

    #[test]
    fn client_messages_display_as_wire_text() {
        assert_eq!(ClientMessage::Initialize.to_string(), "initialize");
        assert_eq!(ClientMessage::Play(7).to_string(), "p:7");
        assert_eq!(ClientMessage::Status.to_string(), "status:");
    }

    #[test]
    fn server_messages_display_as_wire_text() {
        let mut board = GameBoard::new();
        board.apply_move(4);
        assert_eq!(
            ServerMessage::State(board.state()).to_string(),
            "s:EEEEXEEEEOEEEE"
        );
        assert_eq!(
            ServerMessage::RoleAssigned(Player::O).to_string(),
            "Player=O"
        );
        assert_eq!(
            ServerMessage::Invalid("zzz".to_string()).to_string(),
            "invalid:zzz"
        );
    }

    #[test]
    fn server_messages_parse() {
        assert_eq!(
            "Player=X".parse(),
            Ok(ServerMessage::RoleAssigned(Player::X))
        );
        assert!(matches!(
            "Player=E".parse::<ServerMessage>(),
            Err(ParseError::InvalidRole(_))
        ));
        let Ok(ServerMessage::State(state)) = "s:EEEEXEEEEOEEEE".parse() else {
            panic!("state message expected");
        };
        assert_eq!(state.current_player(), Player::O);
        assert!(matches!(
            "s:EEEE".parse::<ServerMessage>(),
            Err(ParseError::InvalidState(FormatError::Length(4)))
        ));
        assert!(matches!(
            "s:XXXOOEEEEOEEEE".parse::<ServerMessage>(),
            Err(ParseError::InvalidState(FormatError::InconsistentWinner { .. }))
        ));
        assert_eq!("shutdown".parse(), Ok(ServerMessage::Shutdown));
    }
}
