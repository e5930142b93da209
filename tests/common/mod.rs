#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_worker::channel::EngineChannel;
use analysis_worker::uci::{Command, EngineSession};
use tokio::sync::mpsc;

pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
pub const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// In-process stand-in for a UCI engine. Answers from fixed tables so
/// replays are deterministic.
#[derive(Clone, Default)]
pub struct FakeEngine {
    /// Raw engine score (side to move, centipawns) per FEN
    scores: HashMap<String, i32>,
    /// Best move per FEN; `e2e4` otherwise
    best_moves: HashMap<String, String>,
    /// Never answers `go`
    silent_search: bool,
    /// Every command received, in order
    pub received: Arc<Mutex<Vec<String>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, fen: &str, cp: i32) -> Self {
        self.scores.insert(fen.to_string(), cp);
        self
    }

    pub fn with_best_move(mut self, fen: &str, mv: &str) -> Self {
        self.best_moves.insert(fen.to_string(), mv.to_string());
        self
    }

    pub fn silent_search(mut self) -> Self {
        self.silent_search = true;
        self
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn reply(&self, fen: &str, cmd: &str) -> Vec<String> {
        let keyword = cmd.split_whitespace().next().unwrap_or("");
        let cp = self.scores.get(fen).copied().unwrap_or(0);
        match keyword {
            "uci" => vec![
                "id name FakeFish".into(),
                "option name Hash type spin default 16 min 1 max 1024".into(),
                "option name Threads type spin default 1 min 1 max 8".into(),
                "uciok".into(),
            ],
            "isready" => vec!["readyok".into()],
            "setoption" => {
                let name = cmd.split_whitespace().nth(2).unwrap_or("");
                if name == "Hash" || name == "Threads" {
                    vec![]
                } else {
                    vec![format!("No such option: {name}")]
                }
            }
            "ucinewgame" | "position" | "stop" | "quit" => vec![],
            "go" if self.silent_search => vec![],
            "go" => {
                let best = self
                    .best_moves
                    .get(fen)
                    .cloned()
                    .unwrap_or_else(|| "e2e4".into());
                vec![
                    "info depth 1 seldepth 1 score cp 999 nodes 20 pv a2a3".into(),
                    format!("info depth 2 seldepth 3 score cp {cp} nodes 200 pv {best}"),
                    format!("info depth 2 currmove {best} currmovenumber 1"),
                    format!("bestmove {best} ponder a7a6"),
                ]
            }
            "eval" => {
                // Static eval is reported from white's side
                let white_cp = if fen.split_whitespace().nth(1) == Some("b") {
                    -cp
                } else {
                    cp
                };
                vec![
                    "      Term    |    White    |    Black    |".into(),
                    format!("Total Evaluation: {:.2} (white side)", white_cp as f64 / 100.0),
                    String::new(),
                ]
            }
            _ => vec![format!("Unknown command: {cmd}")],
        }
    }

    /// Start the engine task and return its channel ends.
    pub fn channel(&self) -> EngineChannel {
        let (input, mut commands) = mpsc::unbounded_channel::<String>();
        let (lines, output) = mpsc::unbounded_channel::<String>();
        let engine = self.clone();

        tokio::spawn(async move {
            let mut fen = String::from("startpos");
            let _ = lines.send("FakeFish 1.0 by nobody".into());
            while let Some(cmd) = commands.recv().await {
                engine.received.lock().unwrap().push(cmd.clone());
                if let Some(rest) = cmd.strip_prefix("position fen ") {
                    fen = rest.to_string();
                }
                if cmd == "quit" {
                    break;
                }
                for line in engine.reply(&fen, &cmd) {
                    if lines.send(line).is_err() {
                        return;
                    }
                }
            }
        });

        EngineChannel::from_parts(input, output)
    }

    /// Channel plus handshake, as the binary does it.
    pub async fn open(&self, label: &'static str) -> EngineSession {
        self.open_with(label, &[], TIMEOUT).await
    }

    pub async fn open_with(
        &self,
        label: &'static str,
        options: &[Command],
        timeout: Duration,
    ) -> EngineSession {
        EngineSession::open(label, self.channel(), options, timeout)
            .await
            .expect("handshake with fake engine")
    }
}

/// Engine whose replies give `1. e4 {0.35} e5 {-0.10}`.
pub fn two_ply_engine() -> FakeEngine {
    // Raw scores are for the side to move: black after e4, white after e5
    FakeEngine::new()
        .with_score(AFTER_E4, -35)
        .with_best_move(AFTER_E4, "e7e5")
        .with_score(AFTER_E4_E5, -10)
        .with_best_move(AFTER_E4_E5, "g1f3")
}
