//! Engine score normalization.
//!
//! Turns the `score (cp|mate) N [upperbound|lowerbound]` part of an engine
//! `info` line into a [`Score`] for the side to move at the scored position.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use shakmaty::Color;

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bscore (cp|mate) (-?\d+)(?: (upperbound|lowerbound))?").expect("score regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundDirection {
    AtLeast,
    AtMost,
}

/// Magnitude carried by a bounded score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundValue {
    Pawns(f64),
    Mate(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Pawns, two decimals
    Numeric(f64),
    /// Distance to mate; which side mates is not kept
    MateIn(u32),
    Bounded(BoundDirection, BoundValue),
}

/// Normalize the score carried by `line`. Returns `None` when the line has no
/// score token.
pub fn normalize(line: &str, side_to_move: Color) -> Option<Score> {
    let cap = SCORE_RE.captures(line)?;
    let n: i64 = cap[2].parse().ok()?;
    let is_white = side_to_move == Color::White;
    let signed = if is_white { n } else { n.checked_neg()? };

    let is_mate = &cap[1] == "mate";
    let Some(qualifier) = cap.get(3) else {
        return Some(if is_mate {
            Score::MateIn(mate_distance(n)?)
        } else {
            Score::Numeric(signed as f64 / 100.0)
        });
    };

    // An upper bound on the engine's number becomes a lower bound once the
    // sign is flipped for black, and vice versa
    let is_upper = qualifier.as_str() == "upperbound";
    let direction = if is_upper == is_white {
        BoundDirection::AtMost
    } else {
        BoundDirection::AtLeast
    };
    let value = if is_mate {
        BoundValue::Mate(mate_distance(n)?)
    } else {
        BoundValue::Pawns(n.unsigned_abs() as f64 / 100.0)
    };
    Some(Score::Bounded(direction, value))
}

fn mate_distance(n: i64) -> Option<u32> {
    u32::try_from(n.unsigned_abs()).ok()
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Pawns(v) => write!(f, "{v:.2}"),
            BoundValue::Mate(k) => write!(f, "Mate in {k}"),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Numeric(v) => write!(f, "{v:.2}"),
            Score::MateIn(k) => write!(f, "Mate in {k}"),
            Score::Bounded(BoundDirection::AtMost, v) => write!(f, "<= {v}"),
            Score::Bounded(BoundDirection::AtLeast, v) => write!(f, ">= {v}"),
        }
    }
}
