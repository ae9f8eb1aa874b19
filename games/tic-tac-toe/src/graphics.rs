//! All relevant drawing functions for the terminal front end are accumulated here.
//!
//! The board is drawn with the cell numbers in the empty cells, so the user knows what to type:
//! ```text
//!  X | 1 | 2
//! ---+---+---
//!  3 | O | 5
//! ---+---+---
//!  6 | 7 | X
//! ```

use backbone_lib::{BoardView, SettingsView, UiEvent};
use protocol::{BOARD_CELLS, CellState};
use std::fmt::Write;

/// Renders one notification into the text we print. A reset gets no own text, the board follows anyway.
pub fn render_event(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Reset => None,
        UiEvent::Board(view) => Some(render_board(view)),
        UiEvent::Settings(settings) => Some(render_settings(settings)),
        UiEvent::Error(reason) => Some(format!("Error: {reason}")),
    }
}

/// Renders one notification as a single JSON line, for front ends driving us through a pipe.
pub fn render_event_json(event: &UiEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(line) => Some(line),
        Err(err) => {
            tracing::error!(?err, "Notification could not be serialized.");
            None
        }
    }
}

pub fn render_board(view: &BoardView) -> String {
    let mut text = String::new();
    let cells = view.state.cells();
    for row in 0..3 {
        if row > 0 {
            text.push_str("---+---+---\n");
        }
        let line: Vec<String> = (0..3)
            .map(|column| {
                let index = row * 3 + column;
                match cells[index] {
                    CellState::Empty => index.to_string(),
                    marked => marked.token().to_string(),
                }
            })
            .collect();
        let _ = writeln!(text, " {}", line.join(" | "));
    }
    text.push_str(&status_line(view));
    text
}

fn status_line(view: &BoardView) -> String {
    let state = &view.state;
    if let Some(winner) = state.winner() {
        let line = state
            .winning_line()
            .map(|cells| format!(" ({}, {}, {})", cells[0], cells[1], cells[2]))
            .unwrap_or_default();
        format!("{winner} wins{line}")
    } else if state.is_draw() {
        "Draw".to_string()
    } else if view.my_turn {
        format!("Your turn ({}), play:0..{}", state.current_player(), BOARD_CELLS - 1)
    } else {
        format!("Waiting for {}", state.current_player())
    }
}

pub fn render_settings(settings: &SettingsView) -> String {
    let mut text = format!("Mode: {}", settings.mode);
    if settings.addresses.is_empty() {
        text.push_str("\nServer not running");
    } else {
        let port = settings
            .listening_port
            .map(|port| format!(":{port}"))
            .unwrap_or_default();
        for address in &settings.addresses {
            let _ = write!(text, "\nListening on {address}{port}");
        }
        let _ = write!(text, "\nConnected clients: {}", settings.connected_clients);
    }
    text
}
