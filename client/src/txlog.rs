use anyhow::{Context, Result};
use peervault_protocol::encoding;
use peervault_protocol::txlog::{Operation, TransactionLog};
use peervault_protocol::Method;
use tracing::{debug, warn};

use crate::{download, upload, Ctx};

/// Stored resource name of the per-user log envelope. The DHT key is
/// `txlog_id(user)`, so the name only shows up in node-side logging.
const TXLOG_RESOURCE_NAME: &str = "transaction-log";

/// Fetches our transaction log from the DHT. An absent log is an empty log;
/// transport and routing failures are real errors left to the caller.
pub async fn get_transaction_log(ctx: &Ctx) -> Result<TransactionLog> {
    let id = ctx.public_key.txlog_id();
    let node = crate::routing::locate(ctx, id).await?;
    let transport = ctx.connect(&node);
    let mut header = ctx.header();
    header.key = id;
    let response = transport
        .round_trip(Method::GetFile, header, Vec::new())
        .await?;
    if !response.is_success() {
        debug!("no transaction log stored yet");
        return Ok(TransactionLog::default());
    }
    let plaintext = download::decrypt_payload(ctx, &response)?;
    encoding::deserialize(&plaintext).context("malformed transaction log")
}

/// Stores the whole log back as an ordinary envelope under `txlog_id(user)`.
///
/// There is no compare-and-swap on the log blob: two clients of the same
/// user writing concurrently lose entries, last writer wins.
pub async fn put_transaction_log(ctx: &Ctx, log: &TransactionLog) -> Result<()> {
    let plaintext = encoding::serialize(log)?;
    upload::post_blob(
        ctx,
        ctx.public_key.txlog_id(),
        TXLOG_RESOURCE_NAME,
        false,
        &plaintext,
    )
    .await
}

/// Read-modify-write: appends one entry for `path` stamped with the current
/// clock and puts the log back.
pub async fn append_entry(ctx: &Ctx, path: &str, operation: Operation) -> Result<()> {
    let mut log = match get_transaction_log(ctx).await {
        Ok(log) => log,
        Err(error) => {
            warn!(?error, "failed to fetch transaction log, starting from empty");
            TransactionLog::default()
        }
    };
    log.append(path, operation, ctx.client_id, ctx.clock.get());
    put_transaction_log(ctx, &log).await
}
