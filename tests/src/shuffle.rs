use std::path::Path;

use anyhow::Result;
use fs_err::{create_dir_all, read_dir, remove_file, symlink_metadata, write};
use rand::distributions::{Alphanumeric, DistString, WeightedIndex};
use rand::prelude::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// A local tree mutation, reported back so the harness can drive the same
/// client calls the filesystem watcher would.
#[derive(Debug, Clone)]
pub enum Mutation {
    Created(String),
    Edited(String),
    Deleted(String),
}

type Shuffler<R> = fn(dir: &Path, &mut R) -> Result<Option<Mutation>>;

pub fn shuffle<R: Rng>(dir: &Path, rng: &mut R) -> Result<Vec<Mutation>> {
    let num_mutations = rng.gen_range(1..=5);
    let shufflers: &[(Shuffler<R>, i32)] = &[(create, 10), (edit, 20), (delete, 10)];
    let distribution = WeightedIndex::new(shufflers.iter().map(|(_, weight)| weight))?;
    let mut mutations = Vec::new();
    for _ in 0..num_mutations {
        let index = distribution.sample(rng);
        if let Some(mutation) = (shufflers[index].0)(dir, rng)? {
            debug!(?mutation, "shuffled");
            mutations.push(mutation);
        }
    }
    Ok(mutations)
}

fn random_name(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(1..=8);
    Alphanumeric.sample_string(rng, len)
}

fn random_content(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(0..=2000);
    Alphanumeric.sample_string(rng, len)
}

fn create(dir: &Path, rng: &mut impl Rng) -> Result<Option<Mutation>> {
    let depth = rng.gen_range(0..=2);
    let mut rel_parts = Vec::new();
    for _ in 0..depth {
        rel_parts.push(random_name(rng));
    }
    rel_parts.push(format!("{}.txt", random_name(rng)));
    let rel = rel_parts.join("/");
    let path = dir.join(&rel);
    if path.exists() {
        return Ok(None);
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    write(&path, random_content(rng))?;
    Ok(Some(Mutation::Created(rel)))
}

fn edit(dir: &Path, rng: &mut impl Rng) -> Result<Option<Mutation>> {
    let Some(rel) = choose_file(dir, rng)? else {
        return Ok(None);
    };
    write(dir.join(&rel), random_content(rng))?;
    Ok(Some(Mutation::Edited(rel)))
}

fn delete(dir: &Path, rng: &mut impl Rng) -> Result<Option<Mutation>> {
    let Some(rel) = choose_file(dir, rng)? else {
        return Ok(None);
    };
    remove_file(dir.join(&rel))?;
    Ok(Some(Mutation::Deleted(rel)))
}

fn choose_file(dir: &Path, rng: &mut impl Rng) -> Result<Option<String>> {
    let mut files = Vec::new();
    find_files(dir, String::new(), &mut files)?;
    Ok(files.choose(rng).cloned())
}

fn find_files(dir: &Path, prefix: String, out: &mut Vec<String>) -> Result<()> {
    for entry in read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if symlink_metadata(entry.path())?.is_dir() {
            find_files(&entry.path(), rel, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}
