//! Per-connection session: line reader, serial writer, connect-time sync.
//!
//! Each accepted connection is serviced by owned tasks that end when the
//! socket does; nothing else keeps a session alive. The reader loop parses
//! `KEY SP VALUE` lines and submits them to the store. The writer task
//! drains the session's outbound queue with one write in flight at a time.
//! A third, short-lived task walks the store snapshot and queues one line
//! per existing entry; sync lines and live broadcasts may interleave, and a
//! client must treat any received line as the current hash for its key.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{Line, Registry, OUTBOUND_QUEUE_DEPTH};
use crate::store::{entry_line, Store};

/// Drives one accepted connection until either half of the socket fails.
pub async fn run(stream: TcpStream, peer: SocketAddr, store: Store, registry: Registry) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = ?err, "failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

    registry.add(outbound.clone());
    tokio::spawn(sync_snapshot(store.clone(), outbound, peer));
    let mut writer_task = tokio::spawn(write_outbound(writer, outbound_rx, peer));

    tokio::select! {
        // Reader finished: EOF or read error, tear the writer down with it.
        () = read_updates(reader, store, peer) => writer_task.abort(),
        // Writer finished: write error or the registry dropped us.
        _ = &mut writer_task => {}
    }
}

async fn read_updates(reader: OwnedReadHalf, store: Store, peer: SocketAddr) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!(peer = %peer, "client disconnected");
                return;
            }
            Ok(_) => match parse_update(&line) {
                Some((key, value)) => store.update(key.to_owned(), value.as_bytes().to_vec()),
                None => warn!(peer = %peer, line = %line.trim_end(), "dropping malformed line"),
            },
            Err(err) => {
                warn!(peer = %peer, error = ?err, "read failed");
                return;
            }
        }
    }
}

async fn write_outbound(mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<Line>, peer: SocketAddr) {
    while let Some(line) = outbound.recv().await {
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            warn!(peer = %peer, error = ?err, "write failed, closing session");
            return;
        }
    }
}

/// Streams the current store contents to a newly connected session, one
/// entry per line, advancing the cursor only after the previous line is
/// queued. Drops out as soon as the session's queue closes.
async fn sync_snapshot(store: Store, outbound: mpsc::Sender<Line>, peer: SocketAddr) {
    let mut entry = store.snapshot_begin().await;
    while let Some((key, hash)) = entry {
        if outbound.send(entry_line(&key, &hash)).await.is_err() {
            debug!(peer = %peer, "session closed during state sync");
            return;
        }
        entry = store.snapshot_next(key).await;
    }
}

/// Splits `KEY SP VALUE` out of one inbound line. The key must be
/// non-empty; the value runs to the end of the line, newline excluded, and
/// may be empty.
fn parse_update(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (key, value) = line.split_once(' ')?;
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::parse_update;

    #[test]
    fn splits_key_and_value_at_the_first_space() {
        assert_eq!(parse_update("foo hello\n"), Some(("foo", "hello")));
        assert_eq!(parse_update("foo hello world\n"), Some(("foo", "hello world")));
    }

    #[test]
    fn value_may_be_empty() {
        assert_eq!(parse_update("foo \n"), Some(("foo", "")));
    }

    #[test]
    fn strips_only_the_trailing_newline() {
        assert_eq!(parse_update("foo bar\r\n"), Some(("foo", "bar\r")));
        assert_eq!(parse_update("foo bar"), Some(("foo", "bar")));
    }

    #[test]
    fn rejects_lines_without_a_separator() {
        assert_eq!(parse_update("no_space_here\n"), None);
        assert_eq!(parse_update("\n"), None);
        assert_eq!(parse_update(""), None);
    }

    #[test]
    fn rejects_an_empty_key() {
        assert_eq!(parse_update(" value\n"), None);
    }
}
