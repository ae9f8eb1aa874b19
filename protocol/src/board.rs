//! The tic-tac-toe board model. This is the only place, where the rules of the game live.
//!
//! The board is stored row-major with index 0 in the upper-left corner:
//! ```text
//!  0 | 1 | 2
//! ---+---+---
//!  3 | 4 | 5
//! ---+---+---
//!  6 | 7 | 8
//! ```
//! The winner is never stored independently. It is always derived from the cells, so a board that got
//! restored or received over the network can never contradict itself.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// The amount of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// A winning line given by its three cell indices in ascending order.
pub type WinLine = [u8; 3];

/// All lines that win the game. The order matters: if more than one line is complete, the first one in
/// this list is reported. Rows first, then columns, then the two diagonals.
pub const WIN_LINES: [WinLine; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// The content of a single cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum CellState {
    #[default]
    Empty,
    X,
    O,
}

impl CellState {
    /// The single character used for this cell on the wire and in the persistence layer.
    pub fn token(self) -> char {
        match self {
            CellState::Empty => 'E',
            CellState::X => 'X',
            CellState::O => 'O',
        }
    }

    /// Inverse of [`CellState::token`].
    pub fn from_token(token: char) -> Option<CellState> {
        match token {
            'E' => Some(CellState::Empty),
            'X' => Some(CellState::X),
            'O' => Some(CellState::O),
            _ => None,
        }
    }

    /// The player that occupies the cell, if any.
    pub fn player(self) -> Option<Player> {
        match self {
            CellState::Empty => None,
            CellState::X => Some(Player::X),
            CellState::O => Some(Player::O),
        }
    }
}

/// One of the two sides. A player is also the role a connection can own on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Player {
    X,
    O,
}

impl Player {
    /// The other side.
    pub fn opponent(self) -> Player {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    pub fn token(self) -> char {
        CellState::from(self).token()
    }

    /// Parses `X` or `O`. `E` is not a player.
    pub fn from_token(token: char) -> Option<Player> {
        CellState::from_token(token).and_then(CellState::player)
    }
}

impl From<Player> for CellState {
    fn from(player: Player) -> Self {
        match player {
            Player::X => CellState::X,
            Player::O => CellState::O,
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Why a move did not get applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveRejection {
    /// The game already has a winner.
    GameDecided,
    /// The cell is not empty.
    CellOccupied,
    /// The index is not on the board.
    OutOfRange,
}

impl Display for MoveRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveRejection::GameDecided => write!(f, "the game is already decided"),
            MoveRejection::CellOccupied => write!(f, "the cell is already occupied"),
            MoveRejection::OutOfRange => write!(f, "the cell index is out of range"),
        }
    }
}

/// The result of [`GameBoard::apply_move`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied,
    Rejected(MoveRejection),
}

impl MoveOutcome {
    pub fn is_applied(self) -> bool {
        self == MoveOutcome::Applied
    }
}

/// A snapshot of the game, as it travels over the wire and into the notifications for the UI.
///
/// Instances only get created by [`GameBoard::state`] and by the codec, which rejects states whose
/// winner differs from [`compute_winner`]. So winner and winning line always match the cells.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameState {
    cells: [CellState; BOARD_CELLS],
    current_player: Player,
    winner: Option<Player>,
    winning_line: Option<WinLine>,
}

impl GameState {
    pub(crate) fn from_raw(
        cells: [CellState; BOARD_CELLS],
        current_player: Player,
        decision: Option<(Player, WinLine)>,
    ) -> GameState {
        GameState {
            cells,
            current_player,
            winner: decision.map(|(player, _)| player),
            winning_line: decision.map(|(_, line)| line),
        }
    }

    pub fn cells(&self) -> &[CellState; BOARD_CELLS] {
        &self.cells
    }

    /// The player that is about to move.
    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn winner(&self) -> Option<Player> {
        self.winner
    }

    pub fn winning_line(&self) -> Option<WinLine> {
        self.winning_line
    }

    /// No winner and no empty cell left.
    pub fn is_draw(&self) -> bool {
        self.winner.is_none() && self.cells.iter().all(|cell| *cell != CellState::Empty)
    }
}

/// Checks all winning lines in their fixed order and returns the first complete one.
pub fn compute_winner(cells: &[CellState; BOARD_CELLS]) -> Option<(Player, WinLine)> {
    WIN_LINES.iter().find_map(|line| {
        let [a, b, c] = line.map(|index| cells[index as usize]);
        match a.player() {
            Some(player) if a == b && b == c => Some((player, *line)),
            _ => None,
        }
    })
}

/// The authoritative game board. Only the engine owns one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameBoard {
    cells: [CellState; BOARD_CELLS],
    current_player: Player,
    /// Cached result of [`compute_winner`], refreshed on every mutation.
    decision: Option<(Player, WinLine)>,
}

impl Default for GameBoard {
    fn default() -> Self {
        GameBoard::new()
    }
}

impl GameBoard {
    /// An empty board with X to move.
    pub fn new() -> GameBoard {
        GameBoard {
            cells: [CellState::Empty; BOARD_CELLS],
            current_player: Player::X,
            decision: None,
        }
    }

    /// Rebuilds a board from its stored parts. The winner gets recomputed from the cells.
    pub fn from_parts(cells: [CellState; BOARD_CELLS], current_player: Player) -> GameBoard {
        GameBoard {
            cells,
            current_player,
            decision: compute_winner(&cells),
        }
    }

    /// Rebuilds a board from a received snapshot. Winner information in the snapshot is ignored and
    /// derived again from the cells.
    pub fn from_state(state: &GameState) -> GameBoard {
        GameBoard::from_parts(state.cells, state.current_player)
    }

    pub fn cells(&self) -> &[CellState; BOARD_CELLS] {
        &self.cells
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn winner(&self) -> Option<Player> {
        self.decision.map(|(player, _)| player)
    }

    pub fn winning_line(&self) -> Option<WinLine> {
        self.decision.map(|(_, line)| line)
    }

    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }

    /// Same as the free function [`compute_winner`] on our cells.
    pub fn compute_winner(&self) -> Option<(Player, WinLine)> {
        compute_winner(&self.cells)
    }

    /// Places the current player on the indicated cell. The turn only passes over if the move did not
    /// decide the game.
    pub fn apply_move(&mut self, index: usize) -> MoveOutcome {
        if self.decision.is_some() {
            return MoveOutcome::Rejected(MoveRejection::GameDecided);
        }
        let Some(cell) = self.cells.get_mut(index) else {
            return MoveOutcome::Rejected(MoveRejection::OutOfRange);
        };
        if *cell != CellState::Empty {
            return MoveOutcome::Rejected(MoveRejection::CellOccupied);
        }
        *cell = self.current_player.into();
        self.decision = compute_winner(&self.cells);
        if self.decision.is_none() {
            self.current_player = self.current_player.opponent();
        }
        MoveOutcome::Applied
    }

    /// Clears the board, X starts again.
    pub fn reset(&mut self) {
        *self = GameBoard::new();
    }

    pub fn state(&self) -> GameState {
        GameState::from_raw(self.cells, self.current_player, self.decision)
    }
}
