//! Rules collaborator for game replay: loads a PGN, validates every move
//! with shakmaty and exposes the position after each ply.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::error::GameError;
use crate::game_data::GameMetadata;
use crate::pgn;

/// A position reached during the game together with the side to move there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub fen: String,
    pub turn: Color,
}

/// What the replay needs from a chess rules implementation.
pub trait RulesEngine {
    /// Load a game from PGN text. Malformed input is rejected here.
    fn load_pgn(pgn: &str) -> Result<Self, GameError>
    where
        Self: Sized;

    /// Moves of the game in SAN, in play order.
    fn moves(&self) -> &[String];

    /// The position immediately after each move, in play order.
    fn positions(&self) -> Vec<PositionSnapshot>;

    /// FEN of the current state.
    fn fen(&self) -> String;

    /// Side to move in the current state.
    fn turn(&self) -> Color;

    /// Take back one move. Returns the FEN of the resulting position, or
    /// `None` when no earlier move exists.
    fn undo(&mut self) -> Option<String>;
}

/// A fully validated game. Starts out at its final position.
#[derive(Debug, Clone)]
pub struct Game {
    pub metadata: GameMetadata,
    moves: Vec<String>,
    /// `history[0]` is the start, `history[i + 1]` follows `moves[i]`
    history: Vec<Chess>,
    /// Number of moves applied in the current state
    applied: usize,
}

impl Game {
    /// Number of plies in the game.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    fn current(&self) -> &Chess {
        &self.history[self.applied]
    }
}

fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

fn start_position(start_fen: Option<&str>) -> Result<Chess, GameError> {
    let Some(fen_str) = start_fen else {
        return Ok(Chess::default());
    };

    let fen: Fen = fen_str.parse().map_err(|e| GameError::InvalidFen {
        fen: fen_str.to_string(),
        reason: format!("{e}"),
    })?;
    fen.into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| GameError::InvalidFen {
            fen: fen_str.to_string(),
            reason: format!("{e}"),
        })
}

impl RulesEngine for Game {
    fn load_pgn(pgn_text: &str) -> Result<Self, GameError> {
        let data = pgn::parse_pgn(pgn_text)?;
        let mut pos = start_position(data.start_fen.as_deref())?;
        let mut history = Vec::with_capacity(data.moves.len() + 1);
        history.push(pos.clone());

        for (ply, san_str) in data.moves.iter().enumerate() {
            let san: SanPlus = san_str.parse().map_err(|e| GameError::InvalidSan {
                ply,
                san: san_str.clone(),
                reason: format!("{e}"),
            })?;
            let mv = san.san.to_move(&pos).map_err(|e| GameError::IllegalMove {
                ply,
                san: san_str.clone(),
                reason: format!("{e}"),
            })?;
            pos.play_unchecked(mv);
            history.push(pos.clone());
        }

        Ok(Self {
            metadata: data.metadata,
            applied: data.moves.len(),
            moves: data.moves,
            history,
        })
    }

    fn moves(&self) -> &[String] {
        &self.moves
    }

    fn positions(&self) -> Vec<PositionSnapshot> {
        self.history
            .iter()
            .skip(1)
            .map(|pos| PositionSnapshot {
                fen: to_fen(pos),
                turn: pos.turn(),
            })
            .collect()
    }

    fn fen(&self) -> String {
        to_fen(self.current())
    }

    fn turn(&self) -> Color {
        self.current().turn()
    }

    fn undo(&mut self) -> Option<String> {
        if self.applied == 0 {
            return None;
        }
        self.applied -= 1;
        Some(self.fen())
    }
}
