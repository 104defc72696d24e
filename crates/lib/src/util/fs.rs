//! Filesystem helpers for moving build trees around.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

/// Point `link` at `target`, replacing whatever is at `link`.
///
/// A plain directory left at `link` is removed too. Losing a race with
/// another process creating the same link is not an error.
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  match fs::symlink_metadata(link) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(link)?,
    Ok(_) => fs::remove_file(link)?,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  match symlink(target, link) {
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
    other => other,
  }
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

/// Move `from` to `to`, replacing any existing tree at `to`.
pub fn replace_dir(from: &Path, to: &Path) -> io::Result<()> {
  remove_dir_if_exists(to)?;
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::rename(from, to)
}

/// Recursively copy `src` into `dst`, keeping symlinks as symlinks.
///
/// Top-level entries of `src` named in `skip` are left out. Returns the
/// number of files copied.
pub fn copy_dir(src: &Path, dst: &Path, skip: &[&str]) -> io::Result<usize> {
  fs::create_dir_all(dst)?;
  let mut copied = 0;

  let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|entry| {
    entry.depth() != 1 || !skip.iter().any(|name| entry.file_name() == OsStr::new(name))
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      symlink(&fs::read_link(entry.path())?, &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
      copied += 1;
    }
  }

  Ok(copied)
}
