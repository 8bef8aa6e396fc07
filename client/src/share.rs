use anyhow::{ensure, Result};
use peervault_protocol::{EncodedPublicKey, Identifier, Method, SharedSecret};
use rsa::RsaPublicKey;
use tracing::info;

use crate::{crypto, routing, Ctx};

/// Grants `recipient` read access to a resource we own.
///
/// The session key is unwrapped with our private key, rewrapped under the
/// recipient's public key, and posted back with the ciphertext untouched
/// (IV included); the responsible node merges the new owner into the
/// envelope's owner table.
pub async fn share(ctx: &Ctx, filename: &str, recipient: &RsaPublicKey) -> Result<()> {
    let recipient_id = EncodedPublicKey::from_key(recipient)?.user_id();
    let key = Identifier::resource_id(filename);
    let node = routing::locate(ctx, key).await?;
    let transport = ctx.connect(&node);

    let mut get_header = ctx.header();
    get_header.key = key;
    let existing = transport
        .round_trip(Method::GetFile, get_header, Vec::new())
        .await?;
    ensure!(
        existing.is_success(),
        "cannot share {filename}: resource unavailable"
    );

    let session_key = crypto::decrypt_rsa(&ctx.private_key, &existing.header.secret)?;
    let wrapped_for_peer = crypto::encrypt_rsa(recipient, &session_key)?;

    let mut header = ctx.header();
    header.key = key;
    header.resource_name = filename.to_owned();
    header.log = true;
    header.secret = existing.header.secret.clone();
    header.shared_with = vec![SharedSecret {
        id: recipient_id,
        secret: wrapped_for_peer,
    }];
    let response = transport
        .round_trip(Method::PostFile, header, existing.data)
        .await?;
    ensure!(response.is_success(), "node rejected share of {filename}");
    info!(%filename, recipient = %recipient_id, "shared");
    Ok(())
}
