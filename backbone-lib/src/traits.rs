//! The seams between the engine and the outside world.
//!
//! The engine itself neither knows how the game gets stored nor how it gets drawn. Persistence is
//! injected as a [`GameStore`], the UI talks to the engine over the channels of
//! [`crate::engine::EngineHandle`].
//!
//! # Stored keys
//!
//! | Key | Content | Default |
//! |-----|---------|---------|
//! | `Grid0` .. `Grid8` | Cell token `E`, `X` or `O` | `E` |
//! | `CurrPlayer` | Player about to move, `X` or `O` | `X` |
//!
//! The winner is never stored, it gets derived from the cells on restore.

use protocol::{BOARD_CELLS, CellState, GameBoard, Player};
use std::collections::HashMap;

/// Key of the player about to move.
pub const CURRENT_PLAYER_KEY: &str = "CurrPlayer";

/// The key for one cell, `Grid0` to `Grid8`.
pub fn grid_key(index: usize) -> String {
    format!("Grid{index}")
}

/// A simple string key value store. Implementations decide on their own how and when things get
/// written, failures have to be handled (logged) inside the implementation.
pub trait GameStore: Send + 'static {
    /// Returns the stored value or the handed over default.
    fn get(&self, key: &str, default: &str) -> String;
    /// Stores a value.
    fn set(&mut self, key: &str, value: &str);
}

/// Keeps everything in memory. Used in tests and as a fallback if nothing should be written to disk.
#[derive(Default, Debug, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl GameStore for MemoryStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Writes all cells and the current player.
pub fn save_board(store: &mut impl GameStore, board: &GameBoard) {
    for (index, cell) in board.cells().iter().enumerate() {
        store.set(&grid_key(index), &cell.token().to_string());
    }
    store.set(CURRENT_PLAYER_KEY, &board.current_player().token().to_string());
}

/// Reads the board back. Unknown or missing values fall back to an empty cell and X to move.
pub fn restore_board(store: &impl GameStore) -> GameBoard {
    let mut cells = [CellState::Empty; BOARD_CELLS];
    for (index, cell) in cells.iter_mut().enumerate() {
        let value = store.get(&grid_key(index), "E");
        *cell = single_token(&value)
            .and_then(CellState::from_token)
            .unwrap_or_else(|| {
                tracing::warn!(index, %value, "Unreadable stored cell, using empty.");
                CellState::Empty
            });
    }
    let value = store.get(CURRENT_PLAYER_KEY, "X");
    let current_player = single_token(&value)
        .and_then(Player::from_token)
        .unwrap_or_else(|| {
            tracing::warn!(%value, "Unreadable stored player, using X.");
            Player::X
        });
    GameBoard::from_parts(cells, current_player)
}

fn single_token(value: &str) -> Option<char> {
    let mut chars = value.chars();
    let token = chars.next()?;
    chars.next().is_none().then_some(token)
}
