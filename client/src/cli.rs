use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "peervault", version)]
pub struct Cli {
    /// Address of a known peer on the network (host:port).
    #[clap(long)]
    pub peer_addr: String,
    /// Our keypair as a PEM file. A fresh keypair is generated if the file
    /// does not exist.
    #[clap(long)]
    pub self_key: PathBuf,
    /// Public key PEM file of the bootstrap peer.
    #[clap(long)]
    pub peer_key: PathBuf,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload every file under a local directory.
    Backup {
        #[clap(long)]
        local_path: PathBuf,
    },
    /// Download a single resource by name.
    Getfile {
        #[clap(long)]
        filename: String,
        #[clap(long)]
        filedest: PathBuf,
    },
    /// Grant another user access to a resource.
    Share {
        #[clap(long)]
        filename: String,
        /// Public key PEM file of the user to share with.
        #[clap(long)]
        share_with_key: PathBuf,
    },
    /// Keep a local directory and the network in sync.
    Sync {
        #[clap(long)]
        local_path: PathBuf,
        #[clap(long, default_value = "1s", value_parser = humantime::parse_duration)]
        poll_interval: Duration,
    },
}
