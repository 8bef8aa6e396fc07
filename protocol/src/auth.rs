//! Request/response authentication glue for the transport.
//!
//! Each RPC body is signed with the sender's RSA key; the signature travels
//! in an HTTP header next to the body. The receiving side recomputes the
//! digest and verifies against the public key it expects to be talking to.
//! Confidentiality of the channel is a deployment concern, not handled here.

use anyhow::{anyhow, Context, Result};
use rsa::sha2::{Digest, Sha256};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};

use crate::EncodedPublicKey;

pub const SIGNATURE_HEADER: &str = "x-peervault-signature";

pub fn sign_payload(key: &RsaPrivateKey, payload: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha256::digest(payload);
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .context("failed to sign payload")
}

pub fn verify_payload(key: &EncodedPublicKey, payload: &[u8], signature: &[u8]) -> Result<()> {
    let key = key.to_key()?;
    let digest = Sha256::digest(payload);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| anyhow!("payload signature verification failed"))
}
