use anyhow::{bail, Context, Result};
use peervault_protocol::{encoding, Identifier, Method, Node};
use tracing::debug;

use crate::Ctx;

/// Finds the node currently responsible for `key`.
///
/// Two hops by design: the bootstrap peer answers `GetSuccessor` but is not
/// necessarily the owner, so the caller opens a second transport to the
/// returned node for the real RPC. There is no retry at this layer; a failed
/// lookup aborts the enclosing operation.
pub async fn locate(ctx: &Ctx, key: Identifier) -> Result<Node> {
    let transport = ctx.connect(&ctx.bootstrap);
    let mut header = ctx.header();
    header.key = key;
    let request_data = encoding::serialize(&key)?;

    let response = transport
        .round_trip(Method::GetSuccessor, header, request_data)
        .await
        .context("routing failure")?;
    if !response.is_success() {
        bail!("routing failure: bootstrap peer returned an error for {key}");
    }
    let node: Node =
        encoding::deserialize(&response.data).context("routing failure: malformed node data")?;
    debug!(%key, addr = %node.addr, "located responsible node");
    Ok(node)
}
