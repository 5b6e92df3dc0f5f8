//! Integration tests driving the server future over loopback sockets with
//! raw line-protocol clients.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use state_mesh::server::Server;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};
use tokio::sync::oneshot;
use tokio::time::timeout;

const HELLO_HASH: &str = "0xaaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
const WORLD_HASH: &str = "0x7c211433f02071597741e6ff5a8ea34789abbf43";
const EMPTY_HASH: &str = "0xda39a3ee5e6b4b0d3255bfef95601890afd80709";
const V1_HASH: &str = "0x5a6df720540c20d95d530d3fd6885511223d5d20";
const V_HASH: &str = "0x7a38d8cbd20d9932ba948efaa364bb62651d5ad4";
const Y_HASH: &str = "0x95cb0bfd2977c761298d9624e4b4d4c72a39974a";
const A_HASH: &str = "0x86f7e437faa5a7fce15d1ddcb9eaeaea377667b8";
const B_HASH: &str = "0xe9d71f5ee7c92d6dc9e92ffdad17b8bd49418f98";
const C_HASH: &str = "0x84a516841ba77a5b4648de2cd0dfcb30ea46dbb4";
const ONE_HASH: &str = "0x356a192b7913b04c54574d18c28d46e6395428ab";
const TWO_HASH: &str = "0xda4b9237bacccdf19c0760cab7aec4a8359010b0";
const THREE_HASH: &str = "0x77de68daecd823babbb58edb1c8e14d7106e83bb";

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server = Server::new(listener);
        let addr = server.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = server.run_until(shutdown).await;
        });
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    async fn connect(&self) -> Result<TestClient> {
        let stream = TcpStream::connect(self.addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(TestClient {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.task.await;
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn expect_line(&mut self, description: &str) -> Result<String> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .with_context(|| format!("{description}: timed out waiting for a line"))??;
        if read == 0 {
            bail!("{description}: connection closed");
        }
        Ok(line.trim_end_matches('\n').to_string())
    }

    /// Asserts nothing arrives for a short grace period.
    async fn expect_silence(&mut self) -> Result<()> {
        let mut line = String::new();
        match timeout(Duration::from_millis(300), self.reader.read_line(&mut line)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => bail!("connection closed while expecting silence"),
            Ok(Ok(_)) => bail!("unexpected line: {}", line.trim_end()),
            Ok(Err(err)) => Err(err.into()),
        }
    }
}

#[tokio::test]
async fn update_echoes_digest_and_deduplicates() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.connect().await?;

    client.send_line("foo hello").await?;
    assert_eq!(
        client.expect_line("first update").await?,
        format!("foo {HELLO_HASH}")
    );

    // Resubmitting the same value changes nothing and broadcasts nothing.
    client.send_line("foo hello").await?;
    client.expect_silence().await?;

    client.send_line("foo world").await?;
    assert_eq!(
        client.expect_line("changed value").await?,
        format!("foo {WORLD_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn empty_value_hashes_the_empty_string() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.connect().await?;

    client.send_line("key ").await?;
    assert_eq!(
        client.expect_line("empty value").await?,
        format!("key {EMPTY_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn updates_reach_every_client_including_the_submitter() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut alice = server.connect().await?;
    let mut bob = server.connect().await?;

    bob.send_line("k v1").await?;
    assert_eq!(
        bob.expect_line("bob's own update").await?,
        format!("k {V1_HASH}")
    );
    assert_eq!(
        alice.expect_line("alice hears bob").await?,
        format!("k {V1_HASH}")
    );

    // The same value from another client is idempotent for everyone.
    alice.send_line("k v1").await?;
    alice.expect_silence().await?;
    bob.expect_silence().await?;

    bob.send_line("done v").await?;
    assert_eq!(
        alice.expect_line("alice sees the follow-up").await?,
        format!("done {V_HASH}")
    );
    assert_eq!(
        bob.expect_line("bob sees the follow-up").await?,
        format!("done {V_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn late_joiner_receives_full_state_before_new_broadcasts() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut alice = server.connect().await?;

    alice.send_line("a 1").await?;
    alice.expect_line("first entry settles").await?;
    alice.send_line("b 2").await?;
    alice.expect_line("second entry settles").await?;

    let mut carol = server.connect().await?;
    let mut sync = vec![
        carol.expect_line("first sync line").await?,
        carol.expect_line("second sync line").await?,
    ];
    sync.sort();
    assert_eq!(
        sync,
        vec![format!("a {ONE_HASH}"), format!("b {TWO_HASH}")]
    );

    // Live traffic resumes only after the sync, one line per key.
    alice.send_line("c 3").await?;
    assert_eq!(
        carol.expect_line("live broadcast after sync").await?,
        format!("c {THREE_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn malformed_line_is_dropped_and_the_session_survives() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut alice = server.connect().await?;
    let mut bob = server.connect().await?;

    alice.send_line("no_space_here").await?;
    alice.expect_silence().await?;
    bob.expect_silence().await?;

    alice.send_line("ok v").await?;
    assert_eq!(
        alice.expect_line("alice still connected").await?,
        format!("ok {V_HASH}")
    );
    assert_eq!(
        bob.expect_line("bob unaffected").await?,
        format!("ok {V_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn disconnected_client_does_not_disturb_broadcasts() -> Result<()> {
    let server = TestServer::spawn().await?;
    let alice = server.connect().await?;
    drop(alice);

    let mut bob = server.connect().await?;
    bob.send_line("x y").await?;
    assert_eq!(
        bob.expect_line("broadcast after a peer vanished").await?,
        format!("x {Y_HASH}")
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn broadcasts_preserve_per_session_submission_order() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.connect().await?;

    client.send_line("k a").await?;
    client.send_line("k b").await?;
    client.send_line("k c").await?;

    assert_eq!(client.expect_line("first").await?, format!("k {A_HASH}"));
    assert_eq!(client.expect_line("second").await?, format!("k {B_HASH}"));
    assert_eq!(client.expect_line("third").await?, format!("k {C_HASH}"));

    server.stop().await;
    Ok(())
}
