use std::time::Duration;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use peervault_protocol::{auth, encoding, EncodedPublicKey, Header, Method, Node, Request, Response};

use crate::Ctx;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated request/response channel to a single node.
///
/// The request body is signed with our key; the response must verify against
/// the public key we targeted, so a node cannot answer for another node's
/// identity. Protocol-level failures (`Status::Error`) are returned to the
/// caller, not raised: an absent envelope is a normal branch in several
/// flows.
pub struct Transport<'a> {
    ctx: &'a Ctx,
    url: String,
    server_key: EncodedPublicKey,
}

impl<'a> Transport<'a> {
    pub(crate) fn new(ctx: &'a Ctx, node: &Node) -> Self {
        Self {
            ctx,
            url: format!("http://{}/rpc", node.addr),
            server_key: node.public_key.clone(),
        }
    }

    pub async fn round_trip(
        &self,
        method: Method,
        mut header: Header,
        data: Vec<u8>,
    ) -> Result<Response> {
        header.clock = self.ctx.clock.get();
        header.data_length = data.len() as u64;
        let body = encoding::serialize(&Request {
            header,
            method,
            data,
        })?;
        let signature = auth::sign_payload(&self.ctx.private_key, &body)?;

        let http_response = self
            .ctx
            .http
            .post(&self.url)
            .header(auth::SIGNATURE_HEADER, BASE64_URL_SAFE_NO_PAD.encode(signature))
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("transport failure: {}", self.url))?;

        let response_signature = http_response
            .headers()
            .get(auth::SIGNATURE_HEADER)
            .context("response signature missing")?
            .to_str()?;
        let response_signature = BASE64_URL_SAFE_NO_PAD.decode(response_signature)?;
        let body = http_response.bytes().await?;
        auth::verify_payload(&self.server_key, &body, &response_signature)
            .context("response was not signed by the expected node")?;

        let response: Response = encoding::deserialize(&body)?;
        self.ctx.clock.observe(response.header.clock);
        Ok(response)
    }
}
