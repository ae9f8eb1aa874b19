//! Notifications from the engine to any number of UI listeners.
//!
//! They go out over a broadcast channel. Sending never blocks the engine, a listener that falls too far
//! behind gets a lag error on its side and simply continues with the newest notifications.

use crate::mode::Mode;
use protocol::GameState;
use serde::Serialize;
use tokio::sync::broadcast;

/// What the UI needs to draw the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BoardView {
    /// The state in its wire encoding.
    pub encoded: String,
    pub state: GameState,
    /// Whether a move made in this process would be accepted right now.
    pub my_turn: bool,
}

/// What the UI needs to show the network settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub mode: Mode,
    /// The addresses remote clients can connect to. Empty unless we host a game.
    pub addresses: Vec<String>,
    /// The port we listen on while hosting.
    pub listening_port: Option<u16>,
    pub connected_clients: usize,
}

/// Serialized as `{"event": "board", "data": {...}}`, so front ends in other processes can follow along.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum UiEvent {
    /// The board has been cleared. Always followed by a [`UiEvent::Board`].
    Reset,
    Board(BoardView),
    Settings(SettingsView),
    /// Something the user asked for did not work out.
    Error(String),
}

/// The sending side, owned by the engine.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: broadcast::Sender<UiEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Notifier {
        let (sender, _) = broadcast::channel(capacity);
        Notifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.sender.subscribe()
    }

    pub fn notify(&self, event: UiEvent) {
        // Having no listener at the moment is fine.
        if self.sender.send(event).is_err() {
            tracing::trace!("No UI listener for notification.");
        }
    }
}
