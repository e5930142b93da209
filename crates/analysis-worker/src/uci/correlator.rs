//! Matches untagged engine reply lines to the pending command that produced them.
//!
//! UCI replies carry no request identifier, so each line is classified by its
//! leading token and handed to the oldest open request of that class. When no
//! request of the line's class is open the line goes to the queue head. That
//! fallback is a best-effort guess: callers keep at most one request per class
//! open on a channel, which is what makes the classification unambiguous.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::uci::command::{Command, CompletionClass, QueryKind};
use crate::uci::line::{self, LineClass};

/// Invoked once with the full accumulated reply when a request completes.
pub type OnComplete = Box<dyn FnOnce(String) + Send>;

/// Invoked for every line assigned to a request (or, channel-wide, for every line).
pub type OnStream = Box<dyn FnMut(&str) + Send>;

/// Where command text goes. One implementation per engine channel.
pub trait Transport {
    fn transmit(&mut self, text: &str) -> Result<(), WorkerError>;
}

impl Transport for mpsc::UnboundedSender<String> {
    fn transmit(&mut self, text: &str) -> Result<(), WorkerError> {
        self.send(text.to_string())
            .map_err(|_| WorkerError::Engine("engine input closed".into()))
    }
}

/// Per-channel status, flipped by the correlator when the matching
/// acknowledgement completes a request.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub started: DateTime<Utc>,
    pub handshake_done: bool,
    pub ready: bool,
}

struct PendingRequest {
    id: u64,
    command: String,
    class: CompletionClass,
    message: String,
    on_stream: Option<OnStream>,
    on_complete: Option<OnComplete>,
    discarded: bool,
}

impl PendingRequest {
    fn accepts(&self, class: LineClass) -> bool {
        matches!(
            (class, self.class),
            (LineClass::Handshake, CompletionClass::Handshake)
                | (LineClass::Readiness, CompletionClass::Readiness)
                | (LineClass::Search, CompletionClass::Search)
                | (
                    LineClass::Query,
                    CompletionClass::Query(QueryKind::Eval | QueryKind::Display)
                )
        )
    }

    fn append(&mut self, raw: &str) {
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(raw);
    }

    fn is_complete(&self, raw: &str) -> bool {
        if line::is_unknown_command(raw) {
            return true;
        }
        match self.class {
            CompletionClass::Handshake => raw == line::HANDSHAKE_ACK,
            CompletionClass::Readiness => raw == line::READY_ACK,
            CompletionClass::Search => line::is_best_move(raw),
            CompletionClass::Query(QueryKind::Display) => line::is_legal_moves(raw),
            CompletionClass::Query(QueryKind::Eval) => {
                line::is_eval_summary_complete(&self.message)
            }
            CompletionClass::Query(QueryKind::Other) | CompletionClass::FireAndForget => false,
        }
    }
}

/// FIFO of open requests against one engine channel.
pub struct Correlator<T: Transport> {
    label: &'static str,
    transport: T,
    queue: Vec<PendingRequest>,
    next_id: u64,
    state: ChannelState,
    observer: Option<OnStream>,
}

impl<T: Transport> Correlator<T> {
    pub fn new(label: &'static str, transport: T) -> Self {
        Self {
            label,
            transport,
            queue: Vec::new(),
            next_id: 0,
            state: ChannelState {
                started: Utc::now(),
                handshake_done: false,
                ready: false,
            },
            observer: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Channel-wide observer that sees every line, even ones that get dropped.
    pub fn set_observer(&mut self, observer: OnStream) {
        self.observer = Some(observer);
    }

    /// Number of open requests, discarded ones included.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Transmit a command. Unless it is fire-and-forget, a pending request is
    /// queued first and `on_complete` fires once its terminal line arrives.
    pub fn send(
        &mut self,
        command: &Command,
        on_complete: Option<OnComplete>,
        on_stream: Option<OnStream>,
    ) -> Result<(), WorkerError> {
        debug!(channel = self.label, cmd = command.text(), "SF <");

        if command.is_fire_and_forget() {
            return self.transport.transmit(command.text());
        }

        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(PendingRequest {
            id,
            command: command.text().to_string(),
            class: command.class(),
            message: String::new(),
            on_stream,
            on_complete,
            discarded: false,
        });

        if let Err(e) = self.transport.transmit(command.text()) {
            self.queue.retain(|req| req.id != id);
            return Err(e);
        }
        Ok(())
    }

    /// Feed one engine line, in arrival order.
    pub fn on_line(&mut self, raw: &str) {
        if let Some(observer) = self.observer.as_mut() {
            observer(raw);
        }

        if line::is_option_rejection(raw) {
            debug!(channel = self.label, line = raw, "Ignoring rejected option");
            return;
        }

        if self.queue.is_empty() {
            debug!(channel = self.label, line = raw, "No pending request, dropping line");
            return;
        }

        let class = line::classify(raw);
        let idx = self
            .queue
            .iter()
            .position(|req| req.accepts(class))
            .unwrap_or(0);

        let req = &mut self.queue[idx];
        req.append(raw);
        if let Some(stream) = req.on_stream.as_mut() {
            stream(raw);
        }

        if !req.is_complete(raw) {
            return;
        }

        let req = self.queue.remove(idx);
        match req.class {
            CompletionClass::Handshake if raw == line::HANDSHAKE_ACK => {
                self.state.handshake_done = true;
            }
            CompletionClass::Readiness if raw == line::READY_ACK => self.state.ready = true,
            _ => {}
        }

        if req.discarded {
            debug!(channel = self.label, id = req.id, cmd = %req.command, "Discarded request finished");
            return;
        }
        if line::is_unknown_command(raw) {
            warn!(channel = self.label, cmd = %req.command, line = raw, "Engine rejected command");
        }
        if let Some(on_complete) = req.on_complete {
            on_complete(req.message);
        }
    }

    /// Stop every open search. Each one still consumes its `bestmove` line,
    /// but its continuation never runs.
    pub fn cancel_all_searches(&mut self) -> Result<(), WorkerError> {
        let stop = Command::stop();
        for req in self
            .queue
            .iter_mut()
            .filter(|req| req.class == CompletionClass::Search && !req.discarded)
        {
            debug!(channel = self.label, id = req.id, cmd = %req.command, "Cancelling search");
            self.transport.transmit(stop.text())?;
            req.discarded = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    impl Transport for Vec<String> {
        fn transmit(&mut self, text: &str) -> Result<(), WorkerError> {
            self.push(text.to_string());
            Ok(())
        }
    }

    struct Closed;

    impl Transport for Closed {
        fn transmit(&mut self, _text: &str) -> Result<(), WorkerError> {
            Err(WorkerError::Engine("closed".into()))
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

    fn recorder(log: &Log, tag: &'static str) -> Option<OnComplete> {
        let log = log.clone();
        Some(Box::new(move |msg: String| log.lock().unwrap().push((tag, msg))))
    }

    fn correlator() -> Correlator<Vec<String>> {
        Correlator::new("test", Vec::new())
    }

    #[test]
    fn test_fire_and_forget_is_not_queued() {
        let mut c = correlator();
        c.send(&Command::position("startpos"), None, None).unwrap();
        c.send(&Command::new_game(), None, None).unwrap();
        assert_eq!(c.pending_count(), 0);
        assert_eq!(c.transport().len(), 2);
    }

    #[test]
    fn test_handshake_collects_options_until_uciok() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::uci(), recorder(&log, "uci"), None).unwrap();

        c.on_line("id name Stockfish");
        c.on_line("option name Hash type spin default 16 min 1 max 1024");
        assert!(log.lock().unwrap().is_empty());
        assert!(!c.state().handshake_done);

        c.on_line("uciok");
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0].1,
            "id name Stockfish\noption name Hash type spin default 16 min 1 max 1024\nuciok"
        );
        assert!(c.state().handshake_done);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_distinct_classes_resolve_in_creation_order() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::uci(), recorder(&log, "uci"), None).unwrap();
        c.send(&Command::is_ready(), recorder(&log, "isready"), None).unwrap();
        c.send(&Command::go_depth(2), recorder(&log, "go"), None).unwrap();

        for l in ["uciok", "readyok", "info depth 1 score cp 10", "bestmove e2e4"] {
            c.on_line(l);
        }

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["uci", "isready", "go"]);
        assert!(c.state().ready);
    }

    #[test]
    fn test_line_goes_to_first_request_of_its_class() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::go_depth(2), recorder(&log, "go"), None).unwrap();
        c.send(&Command::is_ready(), recorder(&log, "isready"), None).unwrap();

        // readyok skips over the open search at the head
        c.on_line("readyok");
        assert_eq!(log.lock().unwrap()[0].0, "isready");

        c.on_line("bestmove d2d4");
        assert_eq!(log.lock().unwrap()[1], ("go", "bestmove d2d4".to_string()));
    }

    #[test]
    fn test_complete_fires_at_most_once() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::go_depth(1), recorder(&log, "go"), None).unwrap();
        c.on_line("bestmove e2e4");
        c.on_line("bestmove e2e4");
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_unmatched_line_falls_back_to_head() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::go_depth(1), recorder(&log, "go"), None).unwrap();

        // Classifies as readiness, but only a search is open
        c.on_line("readyok");
        assert!(log.lock().unwrap().is_empty());
        assert!(!c.state().ready);

        c.on_line("bestmove e2e4");
        assert_eq!(log.lock().unwrap()[0].1, "readyok\nbestmove e2e4");
    }

    #[test]
    fn test_lines_without_requests_are_dropped() {
        let mut c = correlator();
        c.on_line("Stockfish 16 by the Stockfish developers");
        c.on_line("bestmove e2e4");
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_option_rejection_is_ignored() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::set_option("Bogus", 1), None, None).unwrap();
        c.send(&Command::eval(), recorder(&log, "eval"), None).unwrap();

        c.on_line("No such option: Bogus");
        c.on_line("Total Evaluation: 0.12 (white side)");
        assert!(log.lock().unwrap().is_empty());
        c.on_line("");
        let log = log.lock().unwrap();
        assert_eq!(log[0].1, "Total Evaluation: 0.12 (white side)\n");
    }

    #[test]
    fn test_display_ends_at_legal_moves() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::display(), recorder(&log, "d"), None).unwrap();
        c.on_line(" +---+---+");
        c.on_line("Fen: rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        assert!(log.lock().unwrap().is_empty());
        c.on_line("Legal uci moves: a2a3 b2b3");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_command_completes_anything() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::new("bench"), recorder(&log, "bench"), None).unwrap();
        c.on_line("Unknown command: 'bench'. Type help for more information.");
        assert_eq!(log.lock().unwrap()[0].0, "bench");
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_cancelled_search_consumes_bestmove_silently() {
        let log = Log::default();
        let mut c = correlator();
        c.send(&Command::go_depth(20), recorder(&log, "go"), None).unwrap();
        c.cancel_all_searches().unwrap();
        c.cancel_all_searches().unwrap();

        // stop went out exactly once
        let stops = c.transport().iter().filter(|t| t.as_str() == "stop").count();
        assert_eq!(stops, 1);
        assert_eq!(c.pending_count(), 1);

        c.on_line("info depth 5 score cp 12");
        c.on_line("bestmove e2e4");
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_stream_sees_each_assigned_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let everything = Arc::new(Mutex::new(0usize));
        let mut c = correlator();

        let counter = everything.clone();
        c.set_observer(Box::new(move |_| *counter.lock().unwrap() += 1));

        let sink = seen.clone();
        c.send(
            &Command::go_depth(2),
            None,
            Some(Box::new(move |l: &str| sink.lock().unwrap().push(l.to_string()))),
        )
        .unwrap();

        c.on_line("No such option: Foo");
        c.on_line("info depth 1 score cp 3");
        c.on_line("bestmove e2e4");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["info depth 1 score cp 3", "bestmove e2e4"]
        );
        assert_eq!(*everything.lock().unwrap(), 3);
    }

    #[test]
    fn test_failed_transmit_leaves_no_request() {
        let mut c = Correlator::new("closed", Closed);
        assert!(c.send(&Command::is_ready(), None, None).is_err());
        assert_eq!(c.pending_count(), 0);
    }
}
