//! SHA-256 checksums of source trees.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

struct HashWriter<'a>(&'a mut Sha256);

impl Write for HashWriter<'_> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.update(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[derive(Debug, Error)]
pub enum ChecksumError {
  #[error(transparent)]
  Walk(#[from] walkdir::Error),

  #[error("failed to read {path}: {source}")]
  Io { path: PathBuf, source: io::Error },
}

/// Checksum of a source tree.
///
/// Relative paths, file contents and symlink targets contribute. Timestamps
/// and permissions do not. Entries whose file name is in `exclude` are
/// skipped with everything beneath them.
pub fn checksum_tree(root: &Path, exclude: &[&str]) -> Result<String, ChecksumError> {
  let mut hasher = Sha256::new();
  let walker = WalkDir::new(root)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| entry.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  for entry in walker {
    let entry = entry?;
    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    let io_err = |source| ChecksumError::Io {
      path: entry.path().to_path_buf(),
      source,
    };

    let kind = entry.file_type();
    let tag: &[u8] = if kind.is_dir() {
      b"d"
    } else if kind.is_symlink() {
      b"l"
    } else if kind.is_file() {
      b"f"
    } else {
      continue;
    };
    hasher.update(tag);
    hasher.update(rel.to_string_lossy().as_bytes());
    hasher.update([0]);

    if kind.is_symlink() {
      let target = std::fs::read_link(entry.path()).map_err(io_err)?;
      hasher.update(target.to_string_lossy().as_bytes());
    } else if kind.is_file() {
      let mut file = File::open(entry.path()).map_err(io_err)?;
      io::copy(&mut file, &mut HashWriter(&mut hasher)).map_err(io_err)?;
    }
    hasher.update([0]);
  }

  Ok(hex::encode(hasher.finalize()))
}
