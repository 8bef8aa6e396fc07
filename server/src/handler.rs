//! Envelope handlers.
//!
//! Every handler folds the request clock into the node clock and stamps the
//! response with the advanced value. Handler errors are logged and collapse
//! to a bare `Status::Error` reply so storage details never leak to peers.

use anyhow::{ensure, Context, Result};
use peervault_protocol::envelope::Envelope;
use peervault_protocol::{encoding, Method, Request, Response, ResponseHeader, Status};
use tracing::{debug, warn};

use crate::Ctx;

pub async fn dispatch(ctx: &Ctx, request: Request) -> Response {
    let clock = ctx.clock.observe(request.header.clock);
    let method = request.method;
    debug!(?method, key = %request.header.key, from = %request.header.from, "handling request");
    let result = match method {
        Method::UserRegistration => user_registration(ctx, request, clock).await,
        Method::GetSuccessor => get_successor(ctx, request, clock).await,
        Method::GetFile => get_file(ctx, request, clock).await,
        Method::PostFile => post_file(ctx, request, clock).await,
        Method::DeleteFile => delete_file(ctx, request, clock).await,
        Method::GetPublicKey => get_public_key(ctx, request, clock).await,
        Method::PostPublicKey => post_public_key(ctx, request, clock).await,
    };
    result.unwrap_or_else(|error| {
        warn!(?error, ?method, "handler failed");
        Response::error(clock)
    })
}

/// Registration stores the caller's canonical public key under its user id,
/// so other users can resolve an id back to a key via `GetPublicKey`.
async fn user_registration(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    ctx.storage
        .put(request.header.from, request.header.public_key.as_bytes())?;
    Ok(Response::success(clock, Vec::new()))
}

/// Successor lookup. Ring maintenance is outside this server: a single node
/// owns the whole keyspace and answers with its own descriptor. A Chord
/// implementation would consult its finger table here instead.
async fn get_successor(ctx: &Ctx, _request: Request, clock: u64) -> Result<Response> {
    Ok(Response::success(clock, encoding::serialize(&ctx.node)?))
}

async fn get_file(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    let blob = ctx
        .storage
        .get(request.header.key)?
        .context("no envelope stored under this key")?;
    let envelope = Envelope::parse(&blob)?;
    let secret = envelope
        .wrapped_key_for(request.header.from)
        .context("requester is not an owner of this resource")?
        .to_vec();
    Ok(Response {
        status: Status::Success,
        header: ResponseHeader { clock, secret },
        data: envelope.ciphertext,
    })
}

async fn post_file(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    let envelope = match ctx.storage.get(request.header.key)? {
        None => {
            // First write: the poster becomes the first owner, any shared
            // owners ride along.
            let mut envelope = Envelope::new(
                request.header.from,
                request.header.secret.clone(),
                request.data,
            )?;
            envelope.merge_shared(&request.header.shared_with)?;
            envelope
        }
        Some(blob) => {
            let mut envelope = Envelope::parse(&blob)?;
            ensure!(
                envelope.wrapped_key_for(request.header.from).is_some(),
                "requester is not an owner of this resource"
            );
            // Existing owner table survives the rewrite; new shared owners
            // are appended.
            envelope.ciphertext = request.data;
            envelope.merge_shared(&request.header.shared_with)?;
            envelope
        }
    };
    ctx.storage.put(request.header.key, &envelope.to_bytes()?)?;
    Ok(Response::success(clock, Vec::new()))
}

async fn delete_file(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    let blob = ctx
        .storage
        .get(request.header.key)?
        .context("no envelope stored under this key")?;
    let envelope = Envelope::parse(&blob)?;
    ensure!(
        envelope.wrapped_key_for(request.header.from).is_some(),
        "requester is not an owner of this resource"
    );
    ctx.storage.delete(request.header.key)?;
    Ok(Response::success(clock, Vec::new()))
}

/// Opaque pass-through: public key blobs are not envelopes and anyone may
/// read them.
async fn get_public_key(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    let blob = ctx
        .storage
        .get(request.header.key)?
        .context("no public key stored under this key")?;
    Ok(Response::success(clock, blob))
}

async fn post_public_key(ctx: &Ctx, request: Request, clock: u64) -> Result<Response> {
    let _guard = ctx.envelopes.lock().await;
    ctx.storage.put(request.header.key, &request.data)?;
    Ok(Response::success(clock, Vec::new()))
}
