pub mod annotate;
pub mod channel;
pub mod config;
pub mod error;
pub mod replay;
pub mod score;
pub mod uci;

pub use annotate::AnnotatedGame;
pub use error::WorkerError;
pub use replay::{ReplayDriver, ReplayPhase, ReplaySettings, WalkOrder};
pub use score::Score;
