use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use anyhow::Result;
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use fs_err::create_dir_all;
use peervault_protocol::Identifier;
use tempfile::NamedTempFile;

/// Blob store backing the envelope handlers: one file per identifier.
///
/// A put writes to a temp file in a sibling directory and persists it over
/// the target in one rename, so readers never observe a partially written
/// envelope.
pub struct Storage {
    root: PathBuf,
    tmp: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Result<Self> {
        create_dir_all(&root)?;
        let tmp = root.join("tmp");
        create_dir_all(&tmp)?;
        Ok(Self { root, tmp })
    }

    fn blob_path(&self, id: Identifier) -> PathBuf {
        self.root.join(BASE64_URL_SAFE_NO_PAD.encode(id.as_bytes()))
    }

    pub fn get(&self, id: Identifier) -> Result<Option<Vec<u8>>> {
        match fs_err::read(self.blob_path(id)) {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    pub fn put(&self, id: Identifier, data: &[u8]) -> Result<()> {
        let mut file = NamedTempFile::new_in(&self.tmp)?;
        file.write_all(data)?;
        file.persist(self.blob_path(id))?;
        Ok(())
    }

    pub fn delete(&self, id: Identifier) -> Result<()> {
        match fs_err::remove_file(self.blob_path(id)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
