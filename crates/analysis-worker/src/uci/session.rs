//! Per-channel engine session.
//!
//! One task owns the channel's [`Correlator`] and is the only place its queue
//! is touched: it interleaves engine output lines with commands arriving on a
//! mailbox. Callers await replies on `oneshot` receivers instead of passing
//! continuations, and every awaited reply is bounded by a timeout.

use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{self, EngineChannel};
use crate::error::WorkerError;
use crate::uci::command::{Command, CompletionClass};
use crate::uci::correlator::{ChannelState, Correlator, OnComplete, OnStream};
use crate::uci::line;

const QUIT_GRACE: Duration = Duration::from_secs(2);

enum SessionMsg {
    Send {
        command: Command,
        reply: Option<oneshot::Sender<String>>,
        stream: Option<mpsc::UnboundedSender<String>>,
    },
    CancelSearches,
    PendingCount(oneshot::Sender<usize>),
    State(oneshot::Sender<ChannelState>),
}

/// Result of one `go` on the search channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub best_move: String,
    pub ponder: Option<String>,
    /// Last `info ... score ...` line seen before `bestmove`
    pub score_line: Option<String>,
}

/// Handle to one engine channel. Cheap to share by reference; all methods
/// take `&self` and talk to the session task through its mailbox.
pub struct EngineSession {
    label: &'static str,
    mailbox: mpsc::UnboundedSender<SessionMsg>,
    task: JoinHandle<()>,
    process: Option<Child>,
    timeout: Duration,
}

impl EngineSession {
    /// Start the session task without talking to the engine yet.
    pub fn start(label: &'static str, channel: EngineChannel, timeout: Duration) -> Self {
        let (input, output, process) = channel.into_parts();
        let mut correlator = Correlator::new(label, input);
        correlator.set_observer(Box::new(move |l: &str| debug!(channel = label, line = l, "SF >")));

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(correlator, output, inbox));

        Self {
            label,
            mailbox,
            task,
            process,
            timeout,
        }
    }

    /// Start the session and bring the engine up: `uci`, options,
    /// `ucinewgame`, `isready`.
    pub async fn open(
        label: &'static str,
        channel: EngineChannel,
        options: &[Command],
        timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let session = Self::start(label, channel, timeout);

        let handshake = session.request(Command::uci()).await?;
        if !handshake.ends_with(line::HANDSHAKE_ACK) {
            return Err(WorkerError::MalformedReply {
                command: "uci".into(),
                reply: handshake,
            });
        }
        for option in options {
            session.send(option.clone())?;
        }
        session.send(Command::new_game())?;
        session.request(Command::is_ready()).await?;

        info!(channel = label, "Engine ready");
        Ok(session)
    }

    fn post(&self, msg: SessionMsg) -> Result<(), WorkerError> {
        self.mailbox
            .send(msg)
            .map_err(|_| WorkerError::ChannelClosed(self.label))
    }

    /// Send without waiting. Queued commands still get correlated; their
    /// reply is consumed and thrown away.
    pub fn send(&self, command: Command) -> Result<(), WorkerError> {
        self.post(SessionMsg::Send {
            command,
            reply: None,
            stream: None,
        })
    }

    /// Send a command and wait for its full reply.
    pub async fn request(&self, command: Command) -> Result<String, WorkerError> {
        self.request_inner(command, None).await
    }

    /// Like [`request`](Self::request), forwarding each reply line to `stream` as it arrives.
    pub async fn request_streaming(
        &self,
        command: Command,
        stream: mpsc::UnboundedSender<String>,
    ) -> Result<String, WorkerError> {
        self.request_inner(command, Some(stream)).await
    }

    async fn request_inner(
        &self,
        command: Command,
        stream: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<String, WorkerError> {
        if command.is_fire_and_forget() {
            return Err(WorkerError::Engine(format!(
                "'{command}' has no reply to wait for"
            )));
        }

        let text = command.text().to_string();
        let is_search = command.class() == CompletionClass::Search;
        let (reply, done) = oneshot::channel();
        self.post(SessionMsg::Send {
            command,
            reply: Some(reply),
            stream,
        })?;

        match tokio::time::timeout(self.timeout, done).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(WorkerError::ChannelClosed(self.label)),
            Err(_) => {
                warn!(channel = self.label, cmd = %text, after = ?self.timeout, "Request timed out");
                if is_search {
                    // The late bestmove must not be taken for the next search's
                    if let Err(e) = self.cancel_all_searches() {
                        warn!(channel = self.label, error = %e, "Failed to cancel timed-out search");
                    }
                }
                Err(WorkerError::Timeout {
                    channel: self.label,
                    command: text,
                    after: self.timeout,
                })
            }
        }
    }

    /// Search `fen` to `depth` and keep the last scored `info` line.
    pub async fn search(&self, fen: &str, depth: u32) -> Result<SearchOutcome, WorkerError> {
        self.send(Command::position(fen))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let command = Command::go_depth(depth);
        let message = self.request_streaming(command.clone(), tx).await?;

        // The session task streams every line before completing the request
        let mut score_line = None;
        while let Ok(l) = rx.try_recv() {
            if line::is_scored_info(&l) {
                score_line = Some(l);
            }
        }

        let (best_move, ponder) =
            line::parse_best_move(&message).ok_or_else(|| WorkerError::MalformedReply {
                command: command.text().to_string(),
                reply: message.clone(),
            })?;

        Ok(SearchOutcome {
            best_move,
            ponder,
            score_line,
        })
    }

    /// Static evaluation of `fen`, in pawns from white's side when the engine reports one.
    pub async fn static_eval(&self, fen: &str) -> Result<Option<f64>, WorkerError> {
        self.send(Command::position(fen))?;
        let message = self.request(Command::eval()).await?;
        Ok(line::parse_static_eval(&message))
    }

    pub fn cancel_all_searches(&self) -> Result<(), WorkerError> {
        self.post(SessionMsg::CancelSearches)
    }

    pub async fn pending_count(&self) -> Result<usize, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.post(SessionMsg::PendingCount(tx))?;
        rx.await.map_err(|_| WorkerError::ChannelClosed(self.label))
    }

    pub async fn state(&self) -> Result<ChannelState, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.post(SessionMsg::State(tx))?;
        rx.await.map_err(|_| WorkerError::ChannelClosed(self.label))
    }

    /// Send `quit`, stop the session task and reap the engine process.
    pub async fn close(self) {
        let _ = self.send(Command::quit());
        drop(self.mailbox);
        if let Err(e) = self.task.await {
            warn!(channel = self.label, error = %e, "Session task failed");
        }
        if let Some(process) = self.process {
            channel::reap(process, QUIT_GRACE).await;
        }
        info!(channel = self.label, "Engine closed");
    }
}

async fn run(
    mut correlator: Correlator<mpsc::UnboundedSender<String>>,
    mut output: mpsc::UnboundedReceiver<String>,
    mut inbox: mpsc::UnboundedReceiver<SessionMsg>,
) {
    let label = correlator.label();
    loop {
        tokio::select! {
            msg = inbox.recv() => {
                let Some(msg) = msg else { break };
                handle(&mut correlator, msg);
            }
            raw = output.recv() => {
                let Some(raw) = raw else {
                    warn!(channel = label, pending = correlator.pending_count(), "Engine output closed");
                    break;
                };
                correlator.on_line(&raw);
            }
        }
    }
    // Dropping the correlator drops every pending reply sender
    debug!(channel = label, "Session task finished");
}

fn handle(correlator: &mut Correlator<mpsc::UnboundedSender<String>>, msg: SessionMsg) {
    match msg {
        SessionMsg::Send {
            command,
            reply,
            stream,
        } => {
            let on_complete: Option<OnComplete> = reply.map(|tx| {
                Box::new(move |message: String| {
                    let _ = tx.send(message);
                }) as OnComplete
            });
            let on_stream: Option<OnStream> = stream.map(|tx| {
                Box::new(move |l: &str| {
                    let _ = tx.send(l.to_string());
                }) as OnStream
            });
            if let Err(e) = correlator.send(&command, on_complete, on_stream) {
                warn!(channel = correlator.label(), cmd = %command, error = %e, "Failed to send");
            }
        }
        SessionMsg::CancelSearches => {
            if let Err(e) = correlator.cancel_all_searches() {
                warn!(channel = correlator.label(), error = %e, "Failed to cancel searches");
            }
        }
        SessionMsg::PendingCount(tx) => {
            let _ = tx.send(correlator.pending_count());
        }
        SessionMsg::State(tx) => {
            let _ = tx.send(correlator.state().clone());
        }
    }
}
