use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Result};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use peervault_protocol::clock::LamportClock;
use peervault_protocol::{auth, encoding, keys, EncodedPublicKey, Node, Request};
use rsa::RsaPrivateKey;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod handler;
pub mod storage;

use storage::Storage;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_path: PathBuf,
    /// Keypair PEM file; generated if missing.
    pub key_file: PathBuf,
    /// Address other peers use to reach this node. Defaults to `bind_addr`.
    pub public_addr: Option<String>,
}

pub struct Ctx {
    pub storage: Storage,
    pub clock: LamportClock,
    pub node: Node,
    pub private_key: RsaPrivateKey,
    /// Serializes envelope read-modify-write so concurrent posts cannot
    /// interleave owner-table updates. A striped per-key lock would satisfy
    /// the same per-key exclusion contract.
    pub envelopes: Mutex<()>,
}

pub async fn run(config: Config) -> Result<()> {
    let private_key = keys::load_or_generate(&config.key_file)?;
    let public_key = EncodedPublicKey::from_key(&private_key.to_public_key())?;
    let ctx = Arc::new(Ctx {
        storage: Storage::new(config.data_path.clone())?,
        clock: LamportClock::new(),
        node: Node {
            addr: config
                .public_addr
                .clone()
                .unwrap_or_else(|| config.bind_addr.to_string()),
            public_key,
        },
        private_key,
        envelopes: Mutex::new(()),
    });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(node_id = %ctx.node.public_key.user_id(), "listening on {}", config.bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(
                            TokioIo::new(stream),
                            service_fn(move |req| handle_request(ctx.clone(), req)),
                        )
                        .await
                    {
                        warn!(?err, "error while serving connection");
                    }
                });
            }
            Err(err) => warn!(?err, "failed to accept"),
        }
    }
}

async fn handle_request(
    ctx: Arc<Ctx>,
    request: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    try_handle_request(ctx, request).await.or_else(|code| {
        Ok(hyper::Response::builder()
            .status(code)
            .body(Full::new(Bytes::from(code.as_str().to_owned())))
            .expect("response builder failed"))
    })
}

async fn try_handle_request(
    ctx: Arc<Ctx>,
    request: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, StatusCode> {
    if request.method() != hyper::Method::POST || request.uri().path() != "/rpc" {
        return Err(StatusCode::NOT_FOUND);
    }
    let signature = request
        .headers()
        .get(auth::SIGNATURE_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .to_owned();
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|err| {
            warn!(?err, "failed to read request body");
            StatusCode::BAD_REQUEST
        })?
        .to_bytes();
    let request: Request = encoding::deserialize(&body).map_err(|err| {
        warn!(?err, "failed to deserialize request body");
        StatusCode::BAD_REQUEST
    })?;

    authenticate(&request, &body, &signature).map_err(|err| {
        warn!(?err, from = %request.header.from, "request authentication failed");
        StatusCode::UNAUTHORIZED
    })?;

    let response = handler::dispatch(&ctx, request).await;
    let body = encoding::serialize(&response).map_err(|err| {
        warn!(?err, "failed to serialize response");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let signature = auth::sign_payload(&ctx.private_key, &body).map_err(|err| {
        warn!(?err, "failed to sign response");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(hyper::Response::builder()
        .header(
            auth::SIGNATURE_HEADER,
            BASE64_URL_SAFE_NO_PAD.encode(signature),
        )
        .body(Full::new(Bytes::from(body)))
        .expect("response builder failed"))
}

/// The caller must prove possession of the key it claims as its identity:
/// `from` has to be the id of the embedded public key, and the body
/// signature has to verify against that key.
fn authenticate(request: &Request, body: &[u8], signature: &str) -> Result<()> {
    let signature = BASE64_URL_SAFE_NO_PAD.decode(signature)?;
    ensure!(
        request.header.public_key.user_id() == request.header.from,
        "from id does not match the embedded public key"
    );
    auth::verify_payload(&request.header.public_key, body, &signature)
}
