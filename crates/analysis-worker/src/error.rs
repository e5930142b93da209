//! Worker error types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine channel '{0}' is closed")]
    ChannelClosed(&'static str),

    #[error("'{command}' on channel '{channel}' got no reply within {after:?}")]
    Timeout {
        channel: &'static str,
        command: String,
        after: Duration,
    },

    #[error("Malformed engine reply to '{command}': {reply}")]
    MalformedReply { command: String, reply: String },

    #[error("Annotation error: {0}")]
    Annotation(String),

    #[error("Game error: {0}")]
    Game(#[from] chess_core::GameError),
}
