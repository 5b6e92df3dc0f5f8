//! Live session set and broadcast fan-out.
//!
//! The registry actor holds one outbound sender per session, in
//! registration order, and never owns a session: a closed channel marks a
//! session whose tasks have already returned, and it is pruned at the next
//! broadcast. Broadcasts are applied in submission order, so every session
//! observes the same sequence of lines.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

/// Depth of each session's outbound line queue. A session that falls this
/// far behind the broadcast stream is disconnected.
pub const OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// One wire line, shared across all recipient queues.
pub type Line = Arc<str>;

/// Handle for registering sessions and submitting broadcasts.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Command>,
}

enum Command {
    Add { outbound: mpsc::Sender<Line> },
    Broadcast { line: Line },
}

impl Registry {
    /// Starts the registry actor and returns a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// Registers a session's outbound queue for future broadcasts.
    pub fn add(&self, outbound: mpsc::Sender<Line>) {
        let _ = self.tx.send(Command::Add { outbound });
    }

    /// Queues `line` for delivery to every currently registered session,
    /// the submitter's own session included.
    pub fn broadcast(&self, line: Line) {
        let _ = self.tx.send(Command::Broadcast { line });
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut sessions: Vec<mpsc::Sender<Line>> = Vec::new();
    while let Some(command) = commands.recv().await {
        match command {
            Command::Add { outbound } => sessions.push(outbound),
            Command::Broadcast { line } => {
                sessions.retain(|outbound| match outbound.try_send(line.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("dropping session {OUTBOUND_QUEUE_DEPTH} lines behind the broadcast stream");
                        false
                    }
                });
            }
        }
    }
}
