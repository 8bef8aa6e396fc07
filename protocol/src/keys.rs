//! PEM key file handling shared by the client and server binaries.
//!
//! A self key file carries the PKCS#8 private key block followed by the SPKI
//! public key block; peer and share-with key files carry only the public
//! block. Readers accept either layout.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{RsaPrivateKey, RsaPublicKey};

pub const KEY_BITS: usize = 2048;

const PRIVATE_END: &str = "-----END PRIVATE KEY-----";
const PUBLIC_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";

pub fn generate_keypair() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, KEY_BITS).context("failed to generate keypair")
}

/// Reads the keypair at `path`, generating and writing a fresh one if the
/// file does not exist.
pub fn load_or_generate(path: &Path) -> Result<RsaPrivateKey> {
    match fs_err::read_to_string(path) {
        Ok(pem) => read_private_pem_str(&pem),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            let key = generate_keypair()?;
            write_keypair_pem(path, &key)?;
            Ok(key)
        }
        Err(error) => Err(error.into()),
    }
}

pub fn write_keypair_pem(path: &Path, key: &RsaPrivateKey) -> Result<()> {
    let mut pem = key.to_pkcs8_pem(LineEnding::LF)?.to_string();
    pem.push_str(&key.to_public_key().to_public_key_pem(LineEnding::LF)?);
    fs_err::write(path, pem)?;
    Ok(())
}

pub fn write_public_pem(path: &Path, key: &RsaPublicKey) -> Result<()> {
    fs_err::write(path, key.to_public_key_pem(LineEnding::LF)?)?;
    Ok(())
}

pub fn read_private_pem(path: &Path) -> Result<RsaPrivateKey> {
    read_private_pem_str(&fs_err::read_to_string(path)?)
        .with_context(|| format!("failed to read private key from {}", path.display()))
}

pub fn read_private_pem_str(pem: &str) -> Result<RsaPrivateKey> {
    let end = pem
        .find(PRIVATE_END)
        .context("no private key block found")?
        + PRIVATE_END.len();
    RsaPrivateKey::from_pkcs8_pem(pem[..end].trim_start()).context("malformed private key block")
}

pub fn read_public_pem(path: &Path) -> Result<RsaPublicKey> {
    let pem = fs_err::read_to_string(path)?;
    let start = pem
        .find(PUBLIC_BEGIN)
        .with_context(|| format!("no public key block found in {}", path.display()))?;
    RsaPublicKey::from_public_key_pem(pem[start..].trim_end())
        .with_context(|| format!("malformed public key block in {}", path.display()))
}
