use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use peervault_protocol::{Identifier, Method, Response};
use tracing::info;

use crate::{crypto, routing, Ctx};

/// Fetches a resource by name and writes the plaintext to `dest`.
pub async fn getfile(ctx: &Ctx, filename: &str, dest: &Path) -> Result<()> {
    let plaintext = fetch_blob(ctx, Identifier::resource_id(filename))
        .await
        .with_context(|| format!("failed to get {filename}"))?;
    fs_err::write(dest, plaintext)?;
    info!(%filename, dest = %dest.display(), "downloaded");
    Ok(())
}

/// Sync-side materialization: downloads `rel` into the local tree, creating
/// parent directories as needed.
pub(crate) async fn materialize(ctx: &Ctx, local_root: &Path, rel: &str) -> Result<()> {
    let plaintext = fetch_blob(ctx, Identifier::resource_id(rel)).await?;
    let dest = local_path(local_root, rel)?;
    if let Some(parent) = dest.parent() {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(dest, plaintext)?;
    info!(path = %rel, "materialized from network");
    Ok(())
}

/// Locates the responsible node, fetches the envelope under `key` and
/// decrypts its payload with our private key.
pub(crate) async fn fetch_blob(ctx: &Ctx, key: Identifier) -> Result<Vec<u8>> {
    let node = routing::locate(ctx, key).await?;
    let transport = ctx.connect(&node);
    let mut header = ctx.header();
    header.key = key;
    let response = transport
        .round_trip(Method::GetFile, header, Vec::new())
        .await?;
    ensure!(response.is_success(), "resource not found");
    decrypt_payload(ctx, &response)
}

/// Unwraps the session key from the response header and strips the IV off
/// the returned data.
pub(crate) fn decrypt_payload(ctx: &Ctx, response: &Response) -> Result<Vec<u8>> {
    let session_key = crypto::decrypt_rsa(&ctx.private_key, &response.header.secret)?;
    let (iv, ciphertext) = response
        .data
        .split_at_checked(crypto::IV_LEN)
        .context("stored envelope is missing its iv")?;
    crypto::decrypt(&session_key, ciphertext, iv)
}

/// Joins a resource name onto the local root, refusing names that would
/// escape it.
pub(crate) fn local_path(root: &Path, rel: &str) -> Result<PathBuf> {
    let mut out = root.to_path_buf();
    for part in rel.split('/') {
        ensure!(
            !part.is_empty() && part != "." && part != "..",
            "refusing suspicious resource name: {rel:?}"
        );
        out.push(part);
    }
    Ok(out)
}
