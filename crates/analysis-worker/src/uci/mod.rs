//! UCI plumbing: outgoing commands, incoming line classification, the
//! request correlator and the per-channel session that drives it.

pub mod command;
pub mod correlator;
pub mod line;
pub mod session;

pub use command::{Command, CompletionClass, QueryKind};
pub use correlator::{ChannelState, Correlator, Transport};
pub use session::{EngineSession, SearchOutcome};
