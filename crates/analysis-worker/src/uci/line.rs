//! Incoming engine lines: protocol tokens, classification and the small
//! parsers the replay needs (best move, static evaluation).

use std::sync::LazyLock;

use regex::Regex;

pub const HANDSHAKE_ACK: &str = "uciok";
pub const READY_ACK: &str = "readyok";
pub const BEST_MOVE: &str = "bestmove";
pub const INFO: &str = "info";
pub const LEGAL_MOVES: &str = "Legal uci moves";
pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const NO_SUCH_OPTION: &str = "No such option";

static EVAL_SUMMARY_DONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:Total|Final) [Ee]valuation.+\n$").expect("eval summary regex")
});
static EVAL_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Total|Final) [Ee]valuation:?\s+([+-]?\d+(?:\.\d+)?)").expect("eval value regex")
});

/// What kind of request an incoming line most likely belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Handshake,
    Readiness,
    Search,
    /// `eval`, `d` and everything unrecognised
    Query,
}

fn first_word(line: &str) -> &str {
    line.split(' ').next().unwrap_or(line)
}

/// Classify a line by its leading token.
pub fn classify(line: &str) -> LineClass {
    match first_word(line) {
        HANDSHAKE_ACK | "option" | "id" => LineClass::Handshake,
        READY_ACK => LineClass::Readiness,
        BEST_MOVE | INFO => LineClass::Search,
        _ => LineClass::Query,
    }
}

/// A rejected `setoption`. Valid ones print nothing, so nothing waits for these.
pub fn is_option_rejection(line: &str) -> bool {
    line.starts_with(NO_SUCH_OPTION)
}

pub fn is_unknown_command(line: &str) -> bool {
    line.starts_with(UNKNOWN_COMMAND)
}

pub fn is_best_move(line: &str) -> bool {
    line.starts_with(BEST_MOVE)
}

pub fn is_legal_moves(line: &str) -> bool {
    line.starts_with(LEGAL_MOVES)
}

/// The `eval` reply is done once the summary block has been followed by a
/// blank line, i.e. the accumulated message ends with a newline.
pub fn is_eval_summary_complete(message: &str) -> bool {
    EVAL_SUMMARY_DONE_RE.is_match(message)
}

/// `info` line carrying a score, the only kind the replay cares about.
pub fn is_scored_info(line: &str) -> bool {
    first_word(line) == INFO && line.split_whitespace().any(|t| t == "score")
}

/// Best move and optional ponder move from a `bestmove` reply.
pub fn parse_best_move(message: &str) -> Option<(String, Option<String>)> {
    let line = message.lines().rev().find(|l| is_best_move(l))?;
    let mut parts = line.split_whitespace().skip(1);
    let best = parts.next()?.to_string();
    let ponder = match (parts.next(), parts.next()) {
        (Some("ponder"), Some(mv)) => Some(mv.to_string()),
        _ => None,
    };
    Some((best, ponder))
}

/// Static evaluation in pawns (white side) from an `eval` reply.
pub fn parse_static_eval(message: &str) -> Option<f64> {
    EVAL_VALUE_RE
        .captures_iter(message)
        .last()
        .and_then(|cap| cap[1].parse().ok())
}
