pub mod cli;
pub mod crypto;
pub mod download;
pub mod routing;
pub mod share;
pub mod sync;
pub mod transport;
pub mod txlog;
pub mod upload;

use anyhow::{ensure, Context, Result};
use peervault_protocol::clock::LamportClock;
use peervault_protocol::{keys, EncodedPublicKey, Header, Identifier, Method, Node, Origin};
use rsa::RsaPrivateKey;
use tracing::info;

use crate::cli::{Cli, Command};
use crate::transport::{Transport, DEFAULT_TIMEOUT};

pub struct Ctx {
    pub client_id: Identifier,
    pub private_key: RsaPrivateKey,
    pub public_key: EncodedPublicKey,
    pub bootstrap: Node,
    pub clock: LamportClock,
    http: reqwest::Client,
}

impl Ctx {
    pub fn new(private_key: RsaPrivateKey, bootstrap: Node) -> Result<Self> {
        let public_key = EncodedPublicKey::from_key(&private_key.to_public_key())?;
        Ok(Self {
            client_id: public_key.user_id(),
            private_key,
            public_key,
            bootstrap,
            clock: LamportClock::new(),
            http: reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?,
        })
    }

    /// Base request header for this client; callers fill in the key and
    /// operation-specific fields.
    pub fn header(&self) -> Header {
        Header::new(Origin::User, self.client_id, self.public_key.clone())
    }

    pub fn connect<'a>(&'a self, node: &Node) -> Transport<'a> {
        Transport::new(self, node)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let private_key = keys::load_or_generate(&cli.self_key)?;
    let peer_key = keys::read_public_pem(&cli.peer_key)?;
    let bootstrap = Node {
        addr: cli.peer_addr.clone(),
        public_key: EncodedPublicKey::from_key(&peer_key)?,
    };
    let ctx = Ctx::new(private_key, bootstrap)?;
    info!(client_id = %ctx.client_id, "starting client");

    register_user(&ctx).await?;

    match cli.command {
        Command::Backup { local_path } => {
            ensure!(
                fs_err::metadata(&local_path)?.is_dir(),
                "local_path must be a valid directory"
            );
            upload::backup(&ctx, &local_path).await
        }
        Command::Getfile { filename, filedest } => {
            download::getfile(&ctx, &filename, &filedest).await
        }
        Command::Share {
            filename,
            share_with_key,
        } => {
            let recipient = keys::read_public_pem(&share_with_key)?;
            share::share(&ctx, &filename, &recipient).await
        }
        Command::Sync {
            local_path,
            poll_interval,
        } => {
            ensure!(
                fs_err::metadata(&local_path)?.is_dir(),
                "local_path must be a valid directory"
            );
            sync::sync_loop(&ctx, &local_path, poll_interval).await
        }
    }
}

/// Announces this user to the network: the bootstrap peer stores our public
/// key under our user id so other users can look it up.
pub async fn register_user(ctx: &Ctx) -> Result<()> {
    let transport = ctx.connect(&ctx.bootstrap);
    let mut header = ctx.header();
    header.key = ctx.client_id;
    let response = transport
        .round_trip(Method::UserRegistration, header, Vec::new())
        .await
        .context("user registration failed")?;
    ensure!(response.is_success(), "user registration was rejected");
    Ok(())
}
