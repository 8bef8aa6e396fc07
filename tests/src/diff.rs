use std::path::Path;

use anyhow::{bail, Result};
use fs_err::{read_dir, symlink_metadata};

/// Compares two directory trees by file names and contents. Directories that
/// only exist on one side are fine as long as they contain no files: the
/// sync protocol transfers files, not empty directories.
pub fn diff(path1: &Path, path2: &Path) -> Result<()> {
    let files1 = file_map(path1)?;
    let files2 = file_map(path2)?;

    for (rel, content) in &files1 {
        match files2.get(rel) {
            None => bail!("missing in {}: {rel}", path2.display()),
            Some(other) if other != content => bail!("content mismatch for {rel}"),
            Some(_) => {}
        }
    }
    for rel in files2.keys() {
        if !files1.contains_key(rel) {
            bail!("missing in {}: {rel}", path1.display());
        }
    }
    Ok(())
}

fn file_map(root: &Path) -> Result<std::collections::BTreeMap<String, Vec<u8>>> {
    let mut files = std::collections::BTreeMap::new();
    collect(root, String::new(), &mut files)?;
    Ok(files)
}

fn collect(
    dir: &Path,
    prefix: String,
    out: &mut std::collections::BTreeMap<String, Vec<u8>>,
) -> Result<()> {
    for entry in read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if symlink_metadata(entry.path())?.is_dir() {
            collect(&entry.path(), rel, out)?;
        } else {
            out.insert(rel, fs_err::read(entry.path())?);
        }
    }
    Ok(())
}
