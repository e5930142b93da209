//! Evaluation replay: walks a game's positions one ply at a time through the
//! engine channels and collects a score per ply.
//!
//! Phases run `Idle → Loading → Evaluating → Done`. Only one ply is in flight;
//! the search channel and the static-eval channel each carry at most one open
//! request while it is evaluated.

use std::fmt;
use std::str::FromStr;

use chess_core::{PositionSnapshot, RulesEngine};
use chrono::Utc;
use serde::Serialize;
use shakmaty::Color;
use tracing::{debug, info};

use crate::annotate::{self, AnnotatedGame, PlyReport};
use crate::error::WorkerError;
use crate::score::{self, Score};
use crate::uci::{EngineSession, SearchOutcome};

/// Direction in which positions are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkOrder {
    /// From the first move to the last
    Forward,
    /// From the final position back, one undo at a time
    Backward,
}

impl FromStr for WalkOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" | "undo" => Ok(Self::Backward),
            other => Err(format!("unknown walk order '{other}'")),
        }
    }
}

impl fmt::Display for WalkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    Idle,
    Loading,
    Evaluating,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaySettings {
    pub depth: u32,
    pub walk_order: WalkOrder,
}

#[derive(Debug, Clone)]
struct PlyDetail {
    best_move: String,
    ponder: Option<String>,
    static_eval: Option<f64>,
}

/// Progress of one replay. `positions`, `scores` and the per-ply details are
/// in walk order; `moves` is always in play order.
#[derive(Debug, Clone)]
pub struct ReplayState {
    pub positions: Vec<PositionSnapshot>,
    pub moves: Vec<String>,
    pub cursor: usize,
    pub scores: Vec<Score>,
    pub orientation: WalkOrder,
    details: Vec<PlyDetail>,
}

impl ReplayState {
    /// Play-order index of the move that produced `positions[walk_idx]`.
    fn ply_index(&self, walk_idx: usize) -> usize {
        match self.orientation {
            WalkOrder::Forward => walk_idx,
            WalkOrder::Backward => self.positions.len() - 1 - walk_idx,
        }
    }
}

pub struct ReplayDriver<'a> {
    search: &'a EngineSession,
    evaler: Option<&'a EngineSession>,
    settings: ReplaySettings,
    phase: ReplayPhase,
    state: Option<ReplayState>,
}

impl<'a> ReplayDriver<'a> {
    /// `evaler` is the optional second channel used for static evaluation.
    pub fn new(
        search: &'a EngineSession,
        evaler: Option<&'a EngineSession>,
        settings: ReplaySettings,
    ) -> Self {
        Self {
            search,
            evaler,
            settings,
            phase: ReplayPhase::Idle,
            state: None,
        }
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    pub fn state(&self) -> Option<&ReplayState> {
        self.state.as_ref()
    }

    fn reset(&mut self) {
        self.phase = ReplayPhase::Idle;
        self.state = None;
    }

    /// Load a game and collect its positions. Malformed input fails here,
    /// before anything is sent to the engine.
    pub fn load<R: RulesEngine>(&mut self, pgn: &str) -> Result<(), WorkerError> {
        if self.phase != ReplayPhase::Idle {
            return Err(WorkerError::Annotation(format!(
                "cannot load a game while {:?}",
                self.phase
            )));
        }
        self.phase = ReplayPhase::Loading;

        let loaded = R::load_pgn(pgn)
            .map_err(WorkerError::from)
            .and_then(|mut game| {
                let positions = walk(&mut game, self.settings.walk_order)?;
                Ok((game.moves().to_vec(), positions))
            });
        let (moves, positions) = match loaded {
            Ok(v) => v,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        info!(
            plies = moves.len(),
            depth = self.settings.depth,
            walk_order = %self.settings.walk_order,
            "Game loaded"
        );

        self.phase = ReplayPhase::Evaluating;
        self.state = Some(ReplayState {
            positions,
            moves,
            cursor: 0,
            scores: Vec::new(),
            orientation: self.settings.walk_order,
            details: Vec::new(),
        });
        Ok(())
    }

    /// Evaluate the position under the cursor and advance. Returns the phase
    /// after the step. Any failure abandons the replay.
    pub async fn step(&mut self) -> Result<ReplayPhase, WorkerError> {
        if self.phase != ReplayPhase::Evaluating {
            return Err(WorkerError::Annotation(format!(
                "nothing to evaluate while {:?}",
                self.phase
            )));
        }
        let Some(position) = self
            .state
            .as_ref()
            .and_then(|s| s.positions.get(s.cursor))
            .cloned()
        else {
            self.phase = ReplayPhase::Done;
            return Ok(self.phase);
        };

        let evaluated = self.evaluate(&position).await;
        let (score, detail) = match evaluated {
            Ok(v) => v,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let Some(state) = self.state.as_mut() else {
            self.reset();
            return Err(WorkerError::Annotation("replay state lost".into()));
        };
        debug!(
            cursor = state.cursor,
            total = state.positions.len(),
            %score,
            best_move = %detail.best_move,
            "Ply evaluated"
        );
        state.scores.push(score);
        state.details.push(detail);
        state.cursor += 1;
        debug_assert_eq!(state.scores.len(), state.cursor);
        debug_assert!(state.cursor <= state.positions.len());

        if state.cursor == state.positions.len() {
            self.phase = ReplayPhase::Done;
        }
        Ok(self.phase)
    }

    async fn evaluate(
        &self,
        position: &PositionSnapshot,
    ) -> Result<(Score, PlyDetail), WorkerError> {
        let search = self.search.search(&position.fen, self.settings.depth);
        let static_eval = async {
            match self.evaler {
                Some(evaler) => evaler.static_eval(&position.fen).await,
                None => Ok(None),
            }
        };
        let (outcome, static_eval) = tokio::join!(search, static_eval);
        let SearchOutcome {
            best_move,
            ponder,
            score_line,
        } = outcome?;
        let static_eval = static_eval?;

        let score = score_line
            .as_deref()
            .and_then(|l| score::normalize(l, position.turn))
            .ok_or_else(|| WorkerError::MalformedReply {
                command: format!("go depth {}", self.settings.depth),
                reply: format!("no score before bestmove {best_move}"),
            })?;

        Ok((
            score,
            PlyDetail {
                best_move,
                ponder,
                static_eval,
            },
        ))
    }

    /// Put the scores in play order and render the transcript. Returns the
    /// driver to `Idle`.
    pub fn finish(&mut self) -> Result<AnnotatedGame, WorkerError> {
        if self.phase != ReplayPhase::Done {
            return Err(WorkerError::Annotation(format!(
                "replay not finished ({:?})",
                self.phase
            )));
        }
        let Some(state) = self.state.take() else {
            self.reset();
            return Err(WorkerError::Annotation("replay state lost".into()));
        };
        self.reset();

        let total = state.positions.len();
        let mut plies: Vec<Option<PlyReport>> = vec![None; total];
        for (walk_idx, ((position, score), detail)) in state
            .positions
            .iter()
            .zip(&state.scores)
            .zip(&state.details)
            .enumerate()
        {
            let ply = state.ply_index(walk_idx);
            plies[ply] = Some(PlyReport {
                ply,
                san: state.moves[ply].clone(),
                fen: position.fen.clone(),
                side_to_move: match position.turn {
                    Color::White => "white",
                    Color::Black => "black",
                },
                score: *score,
                best_move: detail.best_move.clone(),
                ponder: detail.ponder.clone(),
                static_eval: detail.static_eval,
            });
        }
        let plies: Vec<PlyReport> = plies.into_iter().flatten().collect();
        if plies.len() != total {
            return Err(WorkerError::Annotation(format!(
                "{} of {total} plies scored",
                plies.len()
            )));
        }

        let scores: Vec<Score> = plies.iter().map(|p| p.score).collect();
        let transcript = annotate::render(&state.moves, &scores)?;
        info!(plies = total, "Replay complete");

        Ok(AnnotatedGame {
            depth: self.settings.depth,
            walk_order: state.orientation,
            analyzed_at: Utc::now(),
            plies,
            transcript,
        })
    }

    /// Load, evaluate every ply and finish.
    pub async fn run<R: RulesEngine>(&mut self, pgn: &str) -> Result<AnnotatedGame, WorkerError> {
        self.load::<R>(pgn)?;
        while self.step().await? == ReplayPhase::Evaluating {}
        self.finish()
    }
}

/// Positions to evaluate, in walk order. Either way there is exactly one per
/// move: the position that move produced.
fn walk<R: RulesEngine>(
    game: &mut R,
    order: WalkOrder,
) -> Result<Vec<PositionSnapshot>, WorkerError> {
    let total = game.moves().len();
    let positions = match order {
        WalkOrder::Forward => game.positions(),
        WalkOrder::Backward => {
            let mut walked = Vec::with_capacity(total);
            if total > 0 {
                walked.push(PositionSnapshot {
                    fen: game.fen(),
                    turn: game.turn(),
                });
            }
            while walked.len() < total {
                let Some(fen) = game.undo() else { break };
                walked.push(PositionSnapshot {
                    fen,
                    turn: game.turn(),
                });
            }
            walked
        }
    };

    if positions.len() != total {
        return Err(WorkerError::Annotation(format!(
            "{total} moves but {} positions",
            positions.len()
        )));
    }
    Ok(positions)
}
