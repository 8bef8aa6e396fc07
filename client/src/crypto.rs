//! Content crypto for stored envelopes.
//!
//! Every resource is encrypted under its own 32-byte session key with
//! AES-256-CTR and a one-block IV; the stored form is `iv || ciphertext`.
//! The session key is wrapped with RSA-OAEP under the public key of every
//! authorized owner, yielding exactly 256 bytes per owner for a 2048-bit
//! modulus.
//!
//! Updating an existing envelope re-encrypts under the *same* key and IV
//! (`encrypt_with_iv`), which keeps the owner table and envelope layout
//! intact across rewrites. Reusing a CTR IV leaks the XOR of two plaintexts
//! to anyone who captured both versions of the ciphertext; each write is
//! meant to supersede the previous one, and owners can read both anyway, but
//! this is a known limitation of the format.

use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{anyhow, ensure, Context, Result};
use peervault_protocol::envelope::WRAPPED_KEY_LEN;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::sha2::Sha256;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};

pub const SESSION_KEY_LEN: usize = 32;
/// One AES block, prepended to the ciphertext.
pub const IV_LEN: usize = 16;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Fresh random session key plus its wrapped form for `recipient`.
pub fn generate_session_key(recipient: &RsaPublicKey) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut key = vec![0u8; SESSION_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let wrapped = encrypt_rsa(recipient, &key)?;
    ensure!(
        wrapped.len() == WRAPPED_KEY_LEN,
        "unexpected wrapped key length: {}",
        wrapped.len()
    );
    Ok((key, wrapped))
}

pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut iv = vec![0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = encrypt_with_iv(key, plaintext, &iv)?;
    Ok((ciphertext, iv))
}

/// Deterministic re-encryption under an existing (key, IV) pair, used when
/// rewriting an envelope that other owners already hold the session key for.
pub fn encrypt_with_iv(key: &[u8], plaintext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    apply_keystream(key, iv, plaintext.to_vec())
}

pub fn decrypt(key: &[u8], ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    apply_keystream(key, iv, ciphertext.to_vec())
}

fn apply_keystream(key: &[u8], iv: &[u8], mut data: Vec<u8>) -> Result<Vec<u8>> {
    let mut cipher = Aes256Ctr::new_from_slices(key, iv)
        .map_err(|_| anyhow!("invalid key or iv length ({}, {})", key.len(), iv.len()))?;
    cipher.apply_keystream(&mut data);
    Ok(data)
}

pub fn encrypt_rsa(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
        .context("rsa wrap failed")
}

pub fn decrypt_rsa(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha256>(), data)
        .map_err(|_| anyhow!("envelope unreadable"))
}
