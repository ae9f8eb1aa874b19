//! The fixed length text encoding of a game state, used on the wire after the `s:` prefix.
//!
//! | Position | Content |
//! |----------|---------|
//! | 0..9     | The cells in row-major order, one of `E`, `X`, `O` |
//! | 9        | The player about to move, `X` or `O` |
//! | 10       | The winner, `E` while the game is undecided |
//! | 11..14   | `EEE` while undecided, otherwise the three indices of the winning line as digits |
//!
//! An empty board with X to move encodes as `EEEEEEEEEXEEEE`.

use crate::board::{
    BOARD_CELLS, CellState, GameBoard, GameState, Player, WinLine, compute_winner,
};
use thiserror::Error;

/// Length of every encoded state.
pub const ENCODED_STATE_LEN: usize = 14;

/// The marker for "no winning line".
pub const EMPTY_WIN_LINE: &str = "EEE";

const PLAYER_POSITION: usize = 9;
const WINNER_POSITION: usize = 10;
const WIN_LINE_POSITION: usize = 11;

/// Everything that can be wrong with an encoded state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("encoded state must have {ENCODED_STATE_LEN} characters, found {0}")]
    Length(usize),
    #[error("invalid cell token {token:?} at position {position}")]
    InvalidCell { position: usize, token: char },
    #[error("invalid current player token {0:?}")]
    InvalidPlayer(char),
    #[error("invalid winner token {0:?}")]
    InvalidWinner(char),
    #[error("invalid winning line token {token:?} at position {position}")]
    InvalidWinLine { position: usize, token: char },
    #[error("winner {declared} does not match the cells, they say {actual}")]
    InconsistentWinner { declared: String, actual: String },
}

/// Encodes the board. Convenience wrapper around [`encode_state`].
pub fn encode(board: &GameBoard) -> String {
    encode_state(&board.state())
}

pub fn encode_state(state: &GameState) -> String {
    let mut encoded = String::with_capacity(ENCODED_STATE_LEN);
    encoded.extend(state.cells().iter().map(|cell| cell.token()));
    encoded.push(state.current_player().token());
    match (state.winner(), state.winning_line()) {
        (Some(winner), Some(line)) => {
            encoded.push(winner.token());
            for index in line {
                encoded.push(char::from(b'0' + index));
            }
        }
        _ => {
            encoded.push(CellState::Empty.token());
            encoded.push_str(EMPTY_WIN_LINE);
        }
    }
    encoded
}

/// Decodes a state. The input has to be exactly [`ENCODED_STATE_LEN`] characters long, there is no
/// tolerance for trailing data. Winner and winning line have to be the ones the cells yield.
pub fn decode(encoded: &str) -> Result<GameState, FormatError> {
    let tokens: Vec<char> = encoded.chars().collect();
    if tokens.len() != ENCODED_STATE_LEN {
        return Err(FormatError::Length(tokens.len()));
    }

    let mut cells = [CellState::Empty; BOARD_CELLS];
    for (position, (cell, token)) in cells.iter_mut().zip(&tokens).enumerate() {
        *cell = CellState::from_token(*token).ok_or(FormatError::InvalidCell {
            position,
            token: *token,
        })?;
    }

    let player_token = tokens[PLAYER_POSITION];
    let current_player =
        Player::from_token(player_token).ok_or(FormatError::InvalidPlayer(player_token))?;

    let winner_token = tokens[WINNER_POSITION];
    let winner = CellState::from_token(winner_token)
        .ok_or(FormatError::InvalidWinner(winner_token))?
        .player();

    let line_tokens = &tokens[WIN_LINE_POSITION..];
    let decision = match winner {
        None => {
            if let Some(offset) = line_tokens.iter().position(|token| *token != 'E') {
                return Err(FormatError::InvalidWinLine {
                    position: WIN_LINE_POSITION + offset,
                    token: line_tokens[offset],
                });
            }
            None
        }
        Some(winner) => {
            let mut line: WinLine = [0; 3];
            for (offset, (slot, token)) in line.iter_mut().zip(line_tokens).enumerate() {
                *slot = token
                    .to_digit(10)
                    .filter(|digit| (*digit as usize) < BOARD_CELLS)
                    .map(|digit| digit as u8)
                    .ok_or(FormatError::InvalidWinLine {
                        position: WIN_LINE_POSITION + offset,
                        token: *token,
                    })?;
            }
            Some((winner, line))
        }
    };

    let actual = compute_winner(&cells);
    if actual != decision {
        return Err(FormatError::InconsistentWinner {
            declared: describe_decision(decision),
            actual: describe_decision(actual),
        });
    }

    Ok(GameState::from_raw(cells, current_player, decision))
}

fn describe_decision(decision: Option<(Player, WinLine)>) -> String {
    match decision {
        Some((player, line)) => format!("{player} on {line:?}"),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_encoding() {
        assert_eq!(encode(&GameBoard::new()), "EEEEEEEEEXEEEE");
    }

    #[test]
    fn encoding_after_two_moves() {
        let mut board = GameBoard::new();
        board.apply_move(4);
        board.apply_move(9);
        assert_eq!(encode(&board), "EEEEXEEEEOEEEE");
    }

    #[test]
    fn decided_board_carries_winner_and_line() {
        let mut board = GameBoard::new();
        for index in [2, 0, 4, 1, 6] {
            board.apply_move(index);
        }
        let encoded = encode(&board);
        assert_eq!(encoded, "OOXEXEXEEXX246");
        assert_eq!(encoded.len(), ENCODED_STATE_LEN);
    }

    #[test]
    fn decode_restores_the_snapshot() {
        let mut board = GameBoard::new();
        for index in [0, 4, 8, 2] {
            board.apply_move(index);
        }
        assert_eq!(decode(&encode(&board)), Ok(board.state()));

        for index in [6, 3] {
            board.apply_move(index);
        }
        let state = decode(&encode(&board)).unwrap();
        assert_eq!(state.winner(), Some(Player::O));
        assert_eq!(state.winning_line(), Some([2, 4, 6]));
    }

    #[test]
    fn length_must_match_exactly() {
        assert_eq!(decode("EEEEEEEEEXEEE"), Err(FormatError::Length(13)));
        assert_eq!(decode("EEEEEEEEEXEEEEE"), Err(FormatError::Length(15)));
        assert_eq!(decode(""), Err(FormatError::Length(0)));
    }

    #[test]
    fn bad_tokens_are_reported_with_position() {
        assert_eq!(
            decode("EEEEQEEEEXEEEE"),
            Err(FormatError::InvalidCell {
                position: 4,
                token: 'Q'
            })
        );
        assert_eq!(decode("EEEEEEEEEEEEEE"), Err(FormatError::InvalidPlayer('E')));
        assert_eq!(decode("EEEEEEEEEXZEEE"), Err(FormatError::InvalidWinner('Z')));
        assert_eq!(
            decode("XXXOOEEEEXX01A"),
            Err(FormatError::InvalidWinLine {
                position: 13,
                token: 'A'
            })
        );
        assert_eq!(
            decode("XXXOOEEEEXX019"),
            Err(FormatError::InvalidWinLine {
                position: 13,
                token: '9'
            })
        );
        assert_eq!(
            decode("EEEEEEEEEXE012"),
            Err(FormatError::InvalidWinLine {
                position: 11,
                token: '0'
            })
        );
    }

    #[test]
    fn winner_has_to_match_the_cells() {
        assert_eq!(
            decode("EEEEEEEEEXX012"),
            Err(FormatError::InconsistentWinner {
                declared: "X on [0, 1, 2]".to_string(),
                actual: "none".to_string(),
            })
        );
        assert_eq!(
            decode("XXXOOEEEEXEEEE"),
            Err(FormatError::InconsistentWinner {
                declared: "none".to_string(),
                actual: "X on [0, 1, 2]".to_string(),
            })
        );
        // Column 0 is complete too, but row 0 comes first.
        assert!(matches!(
            decode("XXXXOOXOEXX036"),
            Err(FormatError::InconsistentWinner { .. })
        ));
        assert!(decode("XXXXOOXOEXX012").is_ok());
    }
}
