//! Shared-state store: an ordered `key -> hash` map behind an actor.
//!
//! All reads and writes funnel through the store task's command queue.
//! `update` does not hash inline: the value is handed to the [`Hasher`] and
//! the digest re-enters the queue as a completion command, so the store
//! stays free to service other operations while digests are computed. The
//! hasher releases completions in submission order, which makes the apply
//! order of same-key updates equal their submission order.

use std::collections::BTreeMap;
use std::ops::Bound;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::hasher::Hasher;
use crate::registry::{Line, Registry};

/// Handle for submitting updates and walking the snapshot cursor.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::UnboundedSender<Command>,
}

enum Command {
    Update {
        key: String,
        value: Vec<u8>,
    },
    HashReady {
        key: String,
        hash: String,
    },
    SnapshotBegin {
        resp: oneshot::Sender<Option<(String, String)>>,
    },
    SnapshotNext {
        cursor: String,
        resp: oneshot::Sender<Option<(String, String)>>,
    },
}

/// Formats the wire line for one entry. Shared by live broadcasts and the
/// connect-time sync stream.
pub fn entry_line(key: &str, hash: &str) -> Line {
    format!("{key} {hash}\n").into()
}

impl Store {
    /// Starts the store actor. Changed entries are broadcast through
    /// `registry` as `KEY SP HASH LF` lines.
    pub fn spawn(hasher: Hasher, registry: Registry) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, tx.clone(), hasher, registry));
        Self { tx }
    }

    /// Submits an update for `key`. The value is hashed off the store task;
    /// a broadcast is emitted only when the digest differs from the stored
    /// one (the first update for a key always differs).
    pub fn update(&self, key: String, value: Vec<u8>) {
        let _ = self.tx.send(Command::Update { key, value });
    }

    /// First entry in key order, or `None` when the store is empty.
    pub async fn snapshot_begin(&self) -> Option<(String, String)> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(Command::SnapshotBegin { resp }).ok()?;
        rx.await.ok().flatten()
    }

    /// Entry following `cursor` in key order, or `None` at the end. The
    /// walk runs over the live map; entries inserted while iterating may or
    /// may not be seen, and every insertion is broadcast regardless.
    pub async fn snapshot_next(&self, cursor: String) -> Option<(String, String)> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(Command::SnapshotNext { cursor, resp }).ok()?;
        rx.await.ok().flatten()
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedSender<Command>,
    hasher: Hasher,
    registry: Registry,
) {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Update { key, value } => {
                let completions = completions.clone();
                hasher.hash(value, move |hash| {
                    let _ = completions.send(Command::HashReady { key, hash });
                });
            }
            Command::HashReady { key, hash } => {
                let changed = entries.get(&key).map_or(true, |stored| *stored != hash);
                if changed {
                    let line = entry_line(&key, &hash);
                    entries.insert(key, hash);
                    registry.broadcast(line);
                } else {
                    debug!(key = %key, "value unchanged, skipping broadcast");
                }
            }
            Command::SnapshotBegin { resp } => {
                let first = entries
                    .iter()
                    .next()
                    .map(|(key, hash)| (key.clone(), hash.clone()));
                let _ = resp.send(first);
            }
            Command::SnapshotNext { cursor, resp } => {
                let next = entries
                    .range((Bound::Excluded(cursor), Bound::Unbounded))
                    .next()
                    .map(|(key, hash)| (key.clone(), hash.clone()));
                let _ = resp.send(next);
            }
        }
    }
}
