//! End-to-end harness: one node, two clients of the same user, randomized
//! local edits, sync rounds, tree diffs. Scenario tests for the individual
//! flows live in the test module below.

mod diff;
mod shuffle;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use peervault_client::{sync, Ctx};
use peervault_protocol::keys::read_private_pem_str;
use peervault_protocol::txlog::TransactionLog;
use peervault_protocol::{EncodedPublicKey, Node};
use portpicker::pick_unused_port;
use rand::Rng;
use shuffle::Mutation;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::info;

const SERVER_KEY: &str = include_str!("../keys/server.pem");
const USER_A_KEY: &str = include_str!("../keys/user_a.pem");
#[cfg(test)]
const USER_B_KEY: &str = include_str!("../keys/user_b.pem");
#[cfg(test)]
const USER_C_KEY: &str = include_str!("../keys/user_c.pem");

#[tokio::main]
async fn main() {
    if let Err(err) = try_main().await {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dir = TempDir::new()?;
    let node = start_server(dir.path()).await?;

    let mut clients = Vec::new();
    for index in 0..2 {
        clients.push(TestClient::new(USER_A_KEY, node.clone(), dir.path().join(format!("client{index}")))?);
    }

    let mut rng = rand::thread_rng();
    for round in 0..20 {
        let index = rng.gen_range(0..clients.len());
        let mutations = shuffle::shuffle(&clients[index].root, &mut rng)?;
        for mutation in &mutations {
            // Drive the calls the filesystem watcher would have made. A later
            // mutation may have removed the file again, so re-check the tree.
            match mutation {
                Mutation::Created(rel) | Mutation::Edited(rel) => {
                    if clients[index].root.join(rel).is_file() {
                        sync::post_file(&clients[index].ctx, &clients[index].root, rel).await?;
                    }
                }
                Mutation::Deleted(rel) => {
                    sync::delete_file(&clients[index].ctx, rel).await?;
                }
            }
        }
        for client in &mut clients {
            client.sync().await?;
        }
        diff::diff(&clients[0].root, &clients[1].root)?;
        info!("round {round} converged ({} mutations)", mutations.len());
    }

    Ok(())
}

struct TestClient {
    ctx: Ctx,
    root: PathBuf,
    prior: TransactionLog,
}

impl TestClient {
    fn new(key_pem: &str, node: Node, root: PathBuf) -> Result<Self> {
        fs_err::create_dir_all(&root)?;
        let ctx = Ctx::new(read_private_pem_str(key_pem)?, node)?;
        Ok(Self {
            ctx,
            root,
            prior: TransactionLog::default(),
        })
    }

    async fn sync(&mut self) -> Result<()> {
        self.prior = sync::synchronize(&self.ctx, &self.root, &self.prior).await?;
        Ok(())
    }
}

async fn start_server(dir: &Path) -> Result<Node> {
    let port = pick_unused_port().context("failed to pick an unused port")?;
    let bind_addr: SocketAddr = SocketAddr::new("127.0.0.1".parse()?, port);
    let key_file = dir.join("server.pem");
    fs_err::write(&key_file, SERVER_KEY)?;
    let config = peervault_server::Config {
        bind_addr,
        data_path: dir.join("storage"),
        key_file,
        public_addr: None,
    };

    let server_key = read_private_pem_str(SERVER_KEY)?;
    let node = Node {
        addr: bind_addr.to_string(),
        public_key: EncodedPublicKey::from_key(&server_key.to_public_key())?,
    };

    tokio::spawn(async move {
        if let Err(err) = peervault_server::run(config).await {
            eprintln!("server failed: {err:?}");
            std::process::exit(1);
        }
    });
    wait_until_reachable(bind_addr).await?;
    Ok(node)
}

async fn wait_until_reachable(addr: SocketAddr) -> Result<()> {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        sleep(Duration::from_millis(50)).await;
    }
    bail!("server at {addr} did not become reachable");
}

#[cfg(test)]
mod test {
    use super::*;
    use peervault_client::txlog::get_transaction_log;
    use peervault_client::{download, share, upload};
    use peervault_protocol::txlog::Operation;

    async fn setup() -> Result<(TempDir, Node)> {
        let dir = TempDir::new()?;
        let node = start_server(dir.path()).await?;
        Ok((dir, node))
    }

    fn public_key_of(pem: &str) -> rsa::RsaPublicKey {
        read_private_pem_str(pem).unwrap().to_public_key()
    }

    #[tokio::test]
    async fn backup_then_getfile_returns_identical_plaintext() -> Result<()> {
        let (dir, node) = setup().await?;
        let client = TestClient::new(USER_A_KEY, node, dir.path().join("a"))?;
        fs_err::create_dir_all(client.root.join("docs"))?;
        fs_err::write(client.root.join("docs/x.txt"), b"hello")?;

        upload::backup(&client.ctx, &client.root).await?;

        let dest = dir.path().join("fetched.txt");
        download::getfile(&client.ctx, "docs/x.txt", &dest).await?;
        assert_eq!(fs_err::read(&dest)?, b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn updating_a_file_keeps_earlier_shares_valid() -> Result<()> {
        let (dir, node) = setup().await?;
        let alice = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("a"))?;
        let bob = TestClient::new(USER_B_KEY, node, dir.path().join("b"))?;
        fs_err::write(alice.root.join("x.txt"), b"version one")?;

        upload::backup(&alice.ctx, &alice.root).await?;
        share::share(&alice.ctx, "x.txt", &public_key_of(USER_B_KEY)).await?;

        // The re-upload reuses the session key and IV, so bob's wrapped key
        // still opens the new ciphertext.
        fs_err::write(alice.root.join("x.txt"), b"version two")?;
        upload::upload_file(&alice.ctx, &alice.root, "x.txt").await?;

        let dest = dir.path().join("bob.txt");
        download::getfile(&bob.ctx, "x.txt", &dest).await?;
        assert_eq!(fs_err::read(&dest)?, b"version two");
        Ok(())
    }

    #[tokio::test]
    async fn shared_recipient_can_read() -> Result<()> {
        let (dir, node) = setup().await?;
        let alice = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("a"))?;
        let bob = TestClient::new(USER_B_KEY, node, dir.path().join("b"))?;
        fs_err::write(alice.root.join("x.txt"), b"hello")?;
        upload::backup(&alice.ctx, &alice.root).await?;

        // Before the share, bob is rejected.
        let dest = dir.path().join("bob.txt");
        assert!(download::getfile(&bob.ctx, "x.txt", &dest).await.is_err());

        share::share(&alice.ctx, "x.txt", &public_key_of(USER_B_KEY)).await?;
        download::getfile(&bob.ctx, "x.txt", &dest).await?;
        assert_eq!(fs_err::read(&dest)?, b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn unauthorized_user_cannot_read() -> Result<()> {
        let (dir, node) = setup().await?;
        let alice = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("a"))?;
        let carol = TestClient::new(USER_C_KEY, node, dir.path().join("c"))?;
        fs_err::write(alice.root.join("secret.txt"), b"for alice only")?;
        upload::backup(&alice.ctx, &alice.root).await?;

        let dest = dir.path().join("stolen.txt");
        assert!(download::getfile(&carol.ctx, "secret.txt", &dest).await.is_err());
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn deleted_file_is_not_found() -> Result<()> {
        let (dir, node) = setup().await?;
        let alice = TestClient::new(USER_A_KEY, node, dir.path().join("a"))?;
        fs_err::write(alice.root.join("x.txt"), b"hello")?;
        upload::backup(&alice.ctx, &alice.root).await?;

        fs_err::remove_file(alice.root.join("x.txt"))?;
        sync::delete_file(&alice.ctx, "x.txt").await?;

        let dest = dir.path().join("gone.txt");
        assert!(download::getfile(&alice.ctx, "x.txt", &dest).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn two_clients_of_one_user_converge_last_writer_wins() -> Result<()> {
        let (dir, node) = setup().await?;
        let mut a = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("a"))?;
        let mut b = TestClient::new(USER_A_KEY, node, dir.path().join("b"))?;

        fs_err::write(a.root.join("r.txt"), b"from a")?;
        a.sync().await?;
        b.sync().await?;
        assert_eq!(fs_err::read(b.root.join("r.txt"))?, b"from a");

        // b writes later; its clock is ahead after the first sync round.
        fs_err::write(b.root.join("r.txt"), b"from b")?;
        sync::post_file(&b.ctx, &b.root, "r.txt").await?;

        a.sync().await?;
        assert_eq!(fs_err::read(a.root.join("r.txt"))?, b"from b");

        let log = get_transaction_log(&a.ctx).await?;
        let entries = &log.get("r.txt").unwrap().entries;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp < entries[1].timestamp);
        assert!(entries.iter().all(|e| e.operation == Operation::Update));
        Ok(())
    }

    #[tokio::test]
    async fn deletes_propagate_and_fresh_clients_stay_clean() -> Result<()> {
        let (dir, node) = setup().await?;
        let mut a = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("a"))?;
        let mut b = TestClient::new(USER_A_KEY, node.clone(), dir.path().join("b"))?;

        fs_err::write(a.root.join("x.txt"), b"hello")?;
        a.sync().await?;
        b.sync().await?;
        assert!(b.root.join("x.txt").exists());

        fs_err::remove_file(a.root.join("x.txt"))?;
        sync::delete_file(&a.ctx, "x.txt").await?;

        b.sync().await?;
        assert!(!b.root.join("x.txt").exists());

        // A fresh client's first sync finds only the delete marker: nothing
        // is materialized.
        let mut c = TestClient::new(USER_A_KEY, node, dir.path().join("c"))?;
        c.sync().await?;
        assert!(!c.root.join("x.txt").exists());
        Ok(())
    }
}
