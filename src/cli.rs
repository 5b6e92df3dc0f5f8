use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the shared-state server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a server, forward stdin updates, and print received lines.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// TCP port to listen on. Use 0 for an ephemeral port.
    pub port: u16,

    /// Number of runtime worker threads, minimum 2.
    #[arg(value_parser = parse_threads)]
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to, e.g. 127.0.0.1:9000.
    pub server: SocketAddr,
}

fn parse_threads(value: &str) -> Result<usize, String> {
    let threads: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a thread count"))?;
    if threads < 2 {
        return Err("THREADS must be at least 2".to_string());
    }
    Ok(threads)
}
