//! Annotated transcript and per-ply report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::WorkerError;
use crate::replay::WalkOrder;
use crate::score::Score;

/// Everything the replay learned about one ply.
#[derive(Debug, Clone, Serialize)]
pub struct PlyReport {
    /// 0-based ply index in play order
    pub ply: usize,
    #[serde(rename = "move")]
    pub san: String,
    /// Position reached by the move
    pub fen: String,
    pub side_to_move: &'static str,
    pub score: Score,
    pub best_move: String,
    pub ponder: Option<String>,
    /// Engine's static evaluation, pawns from white's side
    pub static_eval: Option<f64>,
}

/// Output of a full replay.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedGame {
    pub depth: u32,
    pub walk_order: WalkOrder,
    pub analyzed_at: DateTime<Utc>,
    pub plies: Vec<PlyReport>,
    pub transcript: String,
}

/// Fold moves and their scores into `1. e4 {0.35} e5 {-0.10} ` form.
/// `scores[i]` belongs to the position reached by `moves[i]`.
pub fn render(moves: &[String], scores: &[Score]) -> Result<String, WorkerError> {
    if moves.len() != scores.len() {
        return Err(WorkerError::Annotation(format!(
            "{} moves but {} scores",
            moves.len(),
            scores.len()
        )));
    }

    let mut out = String::new();
    for (i, (mv, score)) in moves.iter().zip(scores).enumerate() {
        if i % 2 == 0 {
            out.push_str(&format!("{}. ", i / 2 + 1));
        }
        out.push_str(mv);
        out.push_str(&format!(" {{{score}}} "));
    }
    Ok(out)
}
