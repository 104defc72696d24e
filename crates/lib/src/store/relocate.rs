//! In-place relocation of store artifacts.
//!
//! Rewrites every occurrence of one store root with another of the same
//! length, so no file changes size and nothing needs re-linking.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::StoreError;
use crate::util::fs::symlink;

/// Replace `from` with `to` in every file and symlink target under `dir`.
///
/// Returns the number of entries rewritten.
///
/// # Errors
///
/// Returns `RelocateLengthMismatch` if the two roots differ in length, or an
/// I/O error if an entry cannot be read or written.
pub fn relocate(dir: &Path, from: &str, to: &str) -> Result<usize, StoreError> {
  if from.len() != to.len() {
    return Err(StoreError::RelocateLengthMismatch {
      from: from.to_string(),
      to: to.to_string(),
    });
  }
  if from == to {
    return Ok(0);
  }

  let mut rewritten = 0;
  for entry in WalkDir::new(dir).follow_links(false) {
    let entry = entry.map_err(|e| StoreError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    let path = entry.path();
    let file_type = entry.file_type();

    if file_type.is_symlink() {
      let target = fs::read_link(path).map_err(|e| StoreError::io(path, e))?;
      let target_str = target.to_string_lossy();
      if target_str.contains(from) {
        let new_target = PathBuf::from(target_str.replace(from, to));
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
        symlink(&new_target, path).map_err(|e| StoreError::io(path, e))?;
        rewritten += 1;
      }
    } else if file_type.is_file() {
      let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
      if let Some(replaced) = replace_bytes(&bytes, from.as_bytes(), to.as_bytes()) {
        fs::write(path, replaced).map_err(|e| StoreError::io(path, e))?;
        rewritten += 1;
      }
    }
  }

  debug!(dir = ?dir, rewritten, "relocated artifacts");
  Ok(rewritten)
}

/// Replace all occurrences of `from` in `haystack`, or `None` if there are none.
fn replace_bytes(haystack: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
  if from.is_empty() || haystack.len() < from.len() {
    return None;
  }

  let mut out = Vec::with_capacity(haystack.len());
  let mut found = false;
  let mut i = 0;
  while i < haystack.len() {
    if haystack[i..].starts_with(from) {
      out.extend_from_slice(to);
      i += from.len();
      found = true;
    } else {
      out.push(haystack[i]);
      i += 1;
    }
  }

  found.then_some(out)
}
