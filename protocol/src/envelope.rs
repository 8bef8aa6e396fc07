//! On-disk form of a stored resource.
//!
//! ```text
//! offset        size        field
//! 0             1           owner count N (0..=255)
//! 1             N * 276     owner table: N records of { id: 20, wrapped_key: 256 }
//! 1 + N * 276   rest        ciphertext: iv || aes output
//! ```
//!
//! Every wrapped key in the owner table decrypts, under the matching user's
//! private key, to the same 32-byte session key that produced the ciphertext.
//! The table is the authoritative ACL for the resource: a reader absent from
//! it gets nothing, a zero-owner envelope authorizes no one.

use anyhow::{bail, ensure, Result};

use crate::{Identifier, SharedSecret, IDENTIFIER_LEN};

/// RSA-wrapped session key size for a 2048-bit modulus. Fixed parsing constant.
pub const WRAPPED_KEY_LEN: usize = 256;

/// Owner count is a single byte.
pub const MAX_OWNERS: usize = 255;

const OWNER_RECORD_LEN: usize = IDENTIFIER_LEN + WRAPPED_KEY_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRecord {
    pub id: Identifier,
    pub wrapped_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub owners: Vec<OwnerRecord>,
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn new(owner: Identifier, wrapped_key: Vec<u8>, ciphertext: Vec<u8>) -> Result<Self> {
        ensure!(
            wrapped_key.len() == WRAPPED_KEY_LEN,
            "invalid wrapped key length: got {}, expected {WRAPPED_KEY_LEN}",
            wrapped_key.len()
        );
        Ok(Self {
            owners: vec![OwnerRecord {
                id: owner,
                wrapped_key,
            }],
            ciphertext,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some((&owner_count, rest)) = data.split_first() else {
            bail!("empty envelope");
        };
        let table_len = owner_count as usize * OWNER_RECORD_LEN;
        ensure!(
            rest.len() >= table_len,
            "truncated owner table: {} owners declared, {} bytes available",
            owner_count,
            rest.len()
        );
        let owners = rest[..table_len]
            .chunks_exact(OWNER_RECORD_LEN)
            .map(|record| {
                let (id, wrapped_key) = record.split_at(IDENTIFIER_LEN);
                OwnerRecord {
                    id: Identifier(id.try_into().expect("chunk has exact record length")),
                    wrapped_key: wrapped_key.to_vec(),
                }
            })
            .collect();
        Ok(Self {
            owners,
            ciphertext: rest[table_len..].to_vec(),
        })
    }

    /// Builds the stored form as one contiguous buffer, so a blob store put
    /// replaces the whole envelope atomically.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        ensure!(
            self.owners.len() <= MAX_OWNERS,
            "too many owners: {}",
            self.owners.len()
        );
        let mut out =
            Vec::with_capacity(1 + self.owners.len() * OWNER_RECORD_LEN + self.ciphertext.len());
        out.push(self.owners.len() as u8);
        for owner in &self.owners {
            ensure!(
                owner.wrapped_key.len() == WRAPPED_KEY_LEN,
                "invalid wrapped key length for owner {}",
                owner.id
            );
            out.extend_from_slice(owner.id.as_bytes());
            out.extend_from_slice(&owner.wrapped_key);
        }
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// First matching owner record wins; `None` means the caller is not
    /// authorized for this resource.
    pub fn wrapped_key_for(&self, id: Identifier) -> Option<&[u8]> {
        self.owners
            .iter()
            .find(|owner| owner.id == id)
            .map(|owner| owner.wrapped_key.as_slice())
    }

    /// Appends shared owners, skipping ids already present, so repeated
    /// shares with the same recipient stay idempotent.
    pub fn merge_shared(&mut self, shared: &[SharedSecret]) -> Result<()> {
        for share in shared {
            if self.wrapped_key_for(share.id).is_some() {
                continue;
            }
            ensure!(
                share.secret.len() == WRAPPED_KEY_LEN,
                "invalid wrapped key length for shared owner {}",
                share.id
            );
            ensure!(
                self.owners.len() < MAX_OWNERS,
                "owner table is full ({MAX_OWNERS} owners)"
            );
            self.owners.push(OwnerRecord {
                id: share.id,
                wrapped_key: share.secret.clone(),
            });
        }
        Ok(())
    }
}
