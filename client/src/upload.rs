use std::path::Path;

use anyhow::{Context, Result};
use peervault_protocol::{Identifier, Method};
use tracing::{debug, info, warn};

use crate::{crypto, routing, Ctx};

/// Uploads every regular file under `local_root`. A failed file is logged
/// and skipped; the walk continues.
pub async fn backup(ctx: &Ctx, local_root: &Path) -> Result<()> {
    for rel in collect_files(local_root)? {
        if let Err(error) = upload_file(ctx, local_root, &rel).await {
            warn!(?error, path = %rel, "upload failed");
        }
    }
    Ok(())
}

/// Content op only: encrypts and posts one file. Transaction-log updates are
/// the caller's business (`sync::post_file`).
pub async fn upload_file(ctx: &Ctx, local_root: &Path, rel: &str) -> Result<()> {
    let plaintext = fs_err::read(local_root.join(rel))?;
    post_blob(ctx, Identifier::resource_id(rel), rel, true, &plaintext).await?;
    info!(path = %rel, "uploaded");
    Ok(())
}

/// Encrypts `plaintext` and posts it under `key` to the responsible node.
///
/// If the node already holds an envelope for the key, its session key and IV
/// are reused so the existing owner table stays valid; otherwise a fresh
/// session key is generated and wrapped for ourselves.
pub(crate) async fn post_blob(
    ctx: &Ctx,
    key: Identifier,
    resource_name: &str,
    log: bool,
    plaintext: &[u8],
) -> Result<()> {
    let node = routing::locate(ctx, key).await?;
    let transport = ctx.connect(&node);

    let mut get_header = ctx.header();
    get_header.key = key;
    let existing = transport
        .round_trip(Method::GetFile, get_header, Vec::new())
        .await?;

    let (secret, data) = if existing.is_success() {
        let session_key = crypto::decrypt_rsa(&ctx.private_key, &existing.header.secret)?;
        let iv = existing
            .data
            .get(..crypto::IV_LEN)
            .context("stored envelope is missing its iv")?
            .to_vec();
        let ciphertext = crypto::encrypt_with_iv(&session_key, plaintext, &iv)?;
        (existing.header.secret.clone(), [iv, ciphertext].concat())
    } else {
        debug!(%key, "no existing envelope, generating session key");
        let (session_key, wrapped) =
            crypto::generate_session_key(&ctx.private_key.to_public_key())?;
        let (ciphertext, iv) = crypto::encrypt(&session_key, plaintext)?;
        (wrapped, [iv, ciphertext].concat())
    };

    let mut header = ctx.header();
    header.key = key;
    header.resource_name = resource_name.to_owned();
    header.log = log;
    header.secret = secret;
    let response = transport.round_trip(Method::PostFile, header, data).await?;
    anyhow::ensure!(
        response.is_success(),
        "node rejected upload of {resource_name}"
    );
    Ok(())
}

/// Relative paths ('/'-separated) of all regular files under `root`,
/// depth-first. Symlinks are skipped.
pub fn collect_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    collect_into(root, String::new(), &mut files)?;
    Ok(files)
}

fn collect_into(dir: &Path, prefix: String, out: &mut Vec<String>) -> Result<()> {
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = ?entry.path(), "skipping non-utf8 file name");
            continue;
        };
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            warn!(path = ?entry.path(), "skipping symlink");
        } else if file_type.is_dir() {
            collect_into(&entry.path(), rel, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}
