//! Importing and exporting prebuilt artifacts.
//!
//! An exported artifact is an installation tree, either as a directory named
//! after the build id or as `<id>.tar.gz`, carrying the store root it was
//! built under in `_burrow/storePrefix`. Importing unpacks it into the stage
//! tree, rewrites the old store root to the local one, and moves the result
//! into the install tree.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, Header};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{SANDBOX_DIR, STORE_PREFIX_FILE};
use crate::store::StoreError;
use crate::store::relocate::relocate;
use crate::util::fs::{copy_dir, remove_dir_if_exists, replace_dir};

#[derive(Debug, Error)]
pub enum ImportError {
  #[error("failed to import {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ImportError + '_ {
  move |source| ImportError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Where a prebuilt artifact was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
  Directory(PathBuf),
  Archive(PathBuf),
}

impl ImportSource {
  pub fn path(&self) -> &Path {
    match self {
      ImportSource::Directory(path) | ImportSource::Archive(path) => path,
    }
  }
}

/// Look for a prebuilt artifact of `build_id` in `import_paths`, in order.
pub fn find_import(import_paths: &[PathBuf], build_id: &str) -> Option<ImportSource> {
  for dir in import_paths {
    let candidate = dir.join(build_id);
    if candidate.is_dir() {
      return Some(ImportSource::Directory(candidate));
    }
    let candidate = dir.join(format!("{build_id}.tar.gz"));
    if candidate.is_file() {
      return Some(ImportSource::Archive(candidate));
    }
  }
  None
}

/// Import `source` so that it ends up at `install`.
///
/// `store_root` is the root of the store `install` belongs to; `stage` is a
/// scratch location on the same filesystem as `install`.
///
/// # Errors
///
/// Returns an error if the artifact cannot be unpacked or moved, or if its
/// recorded store root differs in length from `store_root`.
pub fn import_artifact(
  source: &ImportSource,
  store_root: &Path,
  stage: &Path,
  install: &Path,
) -> Result<(), ImportError> {
  info!(from = ?source.path(), to = ?install, "importing prebuilt artifact");
  remove_dir_if_exists(stage).map_err(io_err(stage))?;

  match source {
    ImportSource::Directory(dir) => {
      copy_dir(dir, stage, &[]).map_err(io_err(dir))?;
    }
    ImportSource::Archive(archive) => {
      fs::create_dir_all(stage).map_err(io_err(stage))?;
      let file = File::open(archive).map_err(io_err(archive))?;
      let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
      tar.unpack(stage).map_err(io_err(archive))?;
    }
  }

  let prefix_file = stage.join(SANDBOX_DIR).join(STORE_PREFIX_FILE);
  if prefix_file.is_file() {
    let recorded = fs::read_to_string(&prefix_file).map_err(io_err(&prefix_file))?;
    let recorded = recorded.trim();
    let local = store_root.to_string_lossy();
    let rewritten = relocate(stage, recorded, &local)?;
    debug!(from = recorded, to = %local, rewritten, "relocated imported artifact");
  }

  replace_dir(stage, install).map_err(io_err(install))?;
  Ok(())
}

/// Pack the installation at `install` into `<out_dir>/<build_id>.tar.gz`.
///
/// The store root marker is added to the archive only; `install` is left
/// untouched. A marker already present in `install` is shadowed by it on
/// unpacking.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn export_artifact(install: &Path, build_id: &str, store_root: &Path, out_dir: &Path) -> Result<PathBuf, ImportError> {
  fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
  let archive_path = out_dir.join(format!("{build_id}.tar.gz"));
  let file = File::create(&archive_path).map_err(io_err(&archive_path))?;
  let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
  builder.follow_symlinks(false);
  builder.append_dir_all(".", install).map_err(io_err(install))?;

  let marker = store_root.to_string_lossy();
  let mut header = Header::new_gnu();
  header.set_size(marker.len() as u64);
  header.set_mode(0o644);
  header.set_cksum();
  builder
    .append_data(&mut header, Path::new(SANDBOX_DIR).join(STORE_PREFIX_FILE), marker.as_bytes())
    .map_err(io_err(&archive_path))?;
  builder
    .into_inner()
    .and_then(|encoder| encoder.finish())
    .map_err(io_err(&archive_path))?;

  info!(archive = ?archive_path, "exported artifact");
  Ok(archive_path)
}
