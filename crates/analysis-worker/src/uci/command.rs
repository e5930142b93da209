//! Outgoing UCI commands and the completion class each one expects.

use std::fmt;

/// The two kinds of reply that classify as a generic query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// `eval`: terminated by the evaluation summary block
    Eval,
    /// `d`: terminated by the legal moves listing
    Display,
    /// Anything the engine does not know; only an unknown-command reply ends it
    Other,
}

/// How the correlator recognises the end of a command's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionClass {
    Handshake,
    Readiness,
    Search,
    Query(QueryKind),
    /// Sent but never queued; the engine prints nothing deterministic for these
    FireAndForget,
}

const FIRE_AND_FORGET: &[&str] = &[
    "ucinewgame",
    "position",
    "setoption",
    "stop",
    "ponderhit",
    "flip",
    "quit",
    "resign",
];

impl CompletionClass {
    /// Derive the class from a command's leading keyword.
    pub fn of(text: &str) -> Self {
        let keyword = text.split_whitespace().next().unwrap_or("");
        match keyword {
            "uci" => Self::Handshake,
            "isready" => Self::Readiness,
            "go" => Self::Search,
            "eval" => Self::Query(QueryKind::Eval),
            "d" => Self::Query(QueryKind::Display),
            k if FIRE_AND_FORGET.contains(&k) => Self::FireAndForget,
            _ => Self::Query(QueryKind::Other),
        }
    }
}

/// An immutable command line plus its completion class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    class: CompletionClass,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let class = CompletionClass::of(&text);
        Self { text, class }
    }

    pub fn uci() -> Self {
        Self::new("uci")
    }

    pub fn is_ready() -> Self {
        Self::new("isready")
    }

    pub fn new_game() -> Self {
        Self::new("ucinewgame")
    }

    pub fn position(fen: &str) -> Self {
        Self::new(format!("position fen {fen}"))
    }

    pub fn go_depth(depth: u32) -> Self {
        Self::new(format!("go depth {depth}"))
    }

    pub fn eval() -> Self {
        Self::new("eval")
    }

    /// Stockfish's `d`: board dump ending in the legal moves listing.
    pub fn display() -> Self {
        Self::new("d")
    }

    pub fn stop() -> Self {
        Self::new("stop")
    }

    pub fn set_option(name: &str, value: impl fmt::Display) -> Self {
        Self::new(format!("setoption name {name} value {value}"))
    }

    pub fn quit() -> Self {
        Self::new("quit")
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn class(&self) -> CompletionClass {
        self.class
    }

    pub fn is_fire_and_forget(&self) -> bool {
        self.class == CompletionClass::FireAndForget
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
