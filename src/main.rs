use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpSocket;
use tracing::info;

use state_mesh::{
    cli::{Cli, ClientArgs, Command, ServerArgs},
    client,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args),
        Command::Client(args) => run_client(args),
    }
}

fn run_server(args: ServerArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads)
        .enable_all()
        .build()
        .context("failed to build the runtime")?;

    runtime.block_on(async {
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let socket = TcpSocket::new_v4().context("failed to create the listen socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket.listen(1024).context("failed to listen")?;

        let server = Server::new(listener);
        info!("server listening on {}", server.local_addr()?);
        server.run_until_shutdown().await
    })
}

fn run_client(args: ClientArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the runtime")?;

    runtime.block_on(client::run(args))
}
