pub mod error;
pub mod game;
pub mod game_data;
pub mod pgn;

pub use error::GameError;
pub use game::{Game, PositionSnapshot, RulesEngine};
