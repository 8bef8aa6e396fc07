use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use peervault_server::Config;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[clap(name = "peervault-server", version)]
struct Cli {
    #[clap(long)]
    bind_addr: SocketAddr,
    /// Directory the blob store lives in; created if missing.
    #[clap(long)]
    data_path: PathBuf,
    /// Keypair PEM file; generated if missing.
    #[clap(long)]
    key_file: PathBuf,
    /// Address advertised to peers. Defaults to bind_addr.
    #[clap(long)]
    public_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .init();
    let cli = Cli::parse();
    peervault_server::run(Config {
        bind_addr: cli.bind_addr,
        data_path: cli.data_path,
        key_file: cli.key_file,
        public_addr: cli.public_addr,
    })
    .await
}
