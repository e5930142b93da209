//! Game loading errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("PGN contains no moves")]
    NoMoves,

    #[error("Game {index} requested but the file holds {available} game(s)")]
    GameIndex { index: usize, available: usize },

    #[error("Invalid FEN header '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Unrecognised movetext token '{token}' after {ply} move(s)")]
    InvalidToken { ply: usize, token: String },

    #[error("Invalid SAN '{san}' at ply {ply}: {reason}")]
    InvalidSan {
        ply: usize,
        san: String,
        reason: String,
    },

    #[error("Illegal move '{san}' at ply {ply}: {reason}")]
    IllegalMove {
        ply: usize,
        san: String,
        reason: String,
    },
}
