//! Everything both ends of a tic-tac-toe session have to agree on: the board rules, the fixed length
//! state encoding and the line based messages. Also contains the constants shared across the crates.

pub mod board;
pub mod codec;
pub mod message;

pub use board::{
    BOARD_CELLS, CellState, GameBoard, GameState, MoveOutcome, MoveRejection, Player, WIN_LINES,
    WinLine, compute_winner,
};
pub use codec::{ENCODED_STATE_LEN, FormatError, decode, encode, encode_state};
pub use message::{ClientMessage, ParseError, ServerMessage};

/// The TCP port a hosting engine listens on, unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6868;

/// The buffer sizes for the channels between the tasks of one process.
pub const CHANNEL_BUFFER_SIZE: usize = 256;
