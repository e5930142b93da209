//! Engine channel: a UCI engine reached as a pair of text-line streams.
//!
//! A spawned process is pumped by two tasks (stdin writer, stdout reader);
//! in-process engines hand over the two channel ends directly.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WorkerError;

/// Both directions of one engine connection. Lines carry no trailing newline.
pub struct EngineChannel {
    pub input: mpsc::UnboundedSender<String>,
    pub output: mpsc::UnboundedReceiver<String>,
    process: Option<Child>,
}

impl EngineChannel {
    /// Wrap an engine that already speaks over channels (tests, embedded engines).
    pub fn from_parts(
        input: mpsc::UnboundedSender<String>,
        output: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            input,
            output,
            process: None,
        }
    }

    /// Spawn an engine executable and start pumping its stdio.
    pub fn spawn(path: &str) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Engine(format!("Failed to spawn {path}: {e}")))?;

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Engine("engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Engine("engine stdout not captured".into()))?;

        let (input, mut commands) = mpsc::unbounded_channel::<String>();
        let (lines_tx, output) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(cmd) = commands.recv().await {
                let written = async {
                    stdin.write_all(cmd.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!(error = %e, "Failed to write to engine");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        // Windows builds end lines with \r\n
                        let line = line.trim_end_matches('\r').to_string();
                        if lines_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Engine stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read from engine");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            input,
            output,
            process: Some(process),
        })
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
        Option<Child>,
    ) {
        (self.input, self.output, self.process)
    }
}

/// Wait for an engine process to exit after `quit`, killing it if it lingers.
pub(crate) async fn reap(mut process: Child, grace: Duration) {
    match tokio::time::timeout(grace, process.wait()).await {
        Ok(Ok(status)) => debug!(%status, "Engine exited"),
        Ok(Err(e)) => warn!(error = %e, "Failed to wait for engine"),
        Err(_) => {
            warn!("Engine ignored quit, killing");
            let _ = process.kill().await;
        }
    }
}
