//! Worker configuration from environment variables

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;
use crate::replay::{ReplaySettings, WalkOrder};
use crate::uci::Command;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Path to the UCI engine binary, used for both channels
    pub stockfish_path: String,

    /// Depth for `go depth N` at every ply
    pub search_depth: u32,

    /// Open a second channel for `eval` at every ply
    pub static_eval: bool,

    /// Forward from the first move, or backward by undoing moves
    pub walk_order: WalkOrder,

    /// Upper bound on any single engine request
    pub request_timeout: Duration,

    /// `setoption name Threads`
    pub engine_threads: u32,

    /// `setoption name Hash`, in MB
    pub engine_hash_mb: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let stockfish_path = lookup("STOCKFISH_PATH")
            .unwrap_or_else(|| "/usr/local/bin/stockfish".to_string());

        let search_depth: u32 = parse_var(&lookup, "SEARCH_DEPTH", 12)?;
        if search_depth == 0 {
            return Err(WorkerError::Config("SEARCH_DEPTH must be at least 1".into()));
        }

        let timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(WorkerError::Config(
                "REQUEST_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            stockfish_path,
            search_depth,
            static_eval: parse_var(&lookup, "STATIC_EVAL", true)?,
            walk_order: parse_var(&lookup, "WALK_ORDER", WalkOrder::Forward)?,
            request_timeout: Duration::from_secs(timeout_secs),
            engine_threads: parse_var(&lookup, "ENGINE_THREADS", 1)?,
            engine_hash_mb: parse_var(&lookup, "ENGINE_HASH_MB", 64)?,
        })
    }

    /// Options sent to each engine after the handshake.
    pub fn engine_options(&self) -> Vec<Command> {
        vec![
            Command::set_option("Threads", self.engine_threads),
            Command::set_option("Hash", self.engine_hash_mb),
        ]
    }

    pub fn replay_settings(&self) -> ReplaySettings {
        ReplaySettings {
            depth: self.search_depth,
            walk_order: self.walk_order,
        }
    }
}

/// Parse an optional variable; present-but-invalid values are errors.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, WorkerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkerError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
