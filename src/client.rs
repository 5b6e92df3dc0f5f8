//! Interactive client: stdin lines become updates, received lines go to
//! stdout. `exit` on stdin (or stdin EOF) ends the client.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::cli::ClientArgs;

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut server_lines = BufReader::new(reader).lines();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            server_line = server_lines.next_line() => {
                match server_line {
                    Ok(Some(line)) => write_stdout(&line).await?,
                    Ok(None) => {
                        info!("server closed the connection");
                        break;
                    }
                    Err(err) => {
                        warn!(error = ?err, "read failed");
                        break;
                    }
                }
            }
            input = stdin_lines.next_line() => {
                match input.context("failed to read stdin")? {
                    Some(line) if line.trim() == "exit" => break,
                    Some(line) => {
                        writer
                            .write_all(line.as_bytes())
                            .await
                            .context("failed to send update")?;
                        writer
                            .write_all(b"\n")
                            .await
                            .context("failed to send update")?;
                    }
                    None => break,
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(err) = ctrl_c {
                    warn!(error = ?err, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(err) = writer.shutdown().await {
        warn!(error = ?err, "failed to shut down the connection cleanly");
    }
    Ok(())
}

async fn write_stdout(line: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
