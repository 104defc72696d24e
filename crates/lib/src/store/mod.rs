//! Content-addressed artifact store.
//!
//! # Layout
//!
//! ```text
//! <prefix>/3_______________________/
//! ├── b/                    # Build directories
//! │   ├── <id>/
//! │   └── <id>.log          # Build output of the last attempt
//! ├── i/                    # Finished installations
//! │   └── <id>/
//! └── s/                    # Installations in progress
//!     └── <id>/
//! ```
//!
//! The root of a prefix-derived store always has the same length, whatever
//! the prefix. Artifacts embed the root verbatim (shebang lines, baked-in
//! absolute paths), and keeping the length fixed lets [`relocate`] move them
//! to another prefix by rewriting those bytes in place.

pub mod relocate;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  MAX_SHEBANG_LENGTH, SANDBOX_DIR, SHEBANG_MARKER, STORE_BUILD_TREE, STORE_INSTALL_TREE, STORE_LONGEST_SUFFIX,
  STORE_PADDING_CHAR, STORE_STAGE_TREE, STORE_VERSION,
};

pub use relocate::relocate;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store prefix {prefix} is too long: store root would be {length} characters, at most {max} fit")]
  PrefixTooLong { prefix: PathBuf, length: usize, max: usize },

  #[error("store prefix {0} is not valid UTF-8")]
  NonUtf8Prefix(PathBuf),

  #[error("store i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot relocate {from} to {to}: paths differ in length")]
  RelocateLengthMismatch { from: String, to: String },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },
}

impl StoreError {
  pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
    StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// One of the three fixed subtrees of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTree {
  Build,
  Install,
  Stage,
}

impl StoreTree {
  pub const ALL: [StoreTree; 3] = [StoreTree::Build, StoreTree::Install, StoreTree::Stage];

  pub fn as_str(self) -> &'static str {
    match self {
      StoreTree::Build => STORE_BUILD_TREE,
      StoreTree::Install => STORE_INSTALL_TREE,
      StoreTree::Stage => STORE_STAGE_TREE,
    }
  }
}

/// A store rooted at `path`.
///
/// `pretty_path` is the symbolic spelling of the root (`%store%`,
/// `%localStore%`) used when rendering portable build plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
  pub path: PathBuf,
  pub pretty_path: String,
}

/// Number of characters a padded store root occupies.
///
/// The shebang limit minus the `#!` marker minus the longest suffix that
/// follows the root inside a shebang line.
pub fn padded_root_length() -> usize {
  MAX_SHEBANG_LENGTH - SHEBANG_MARKER.len() - STORE_LONGEST_SUFFIX.len()
}

/// Derive the fixed-length store root for `prefix`.
///
/// The root is `<prefix>/<version>` right-padded with `_`.
///
/// # Errors
///
/// Returns `PrefixTooLong` if `<prefix>/<version>` alone exceeds the budget and
/// `NonUtf8Prefix` if the prefix cannot be measured as text.
pub fn padded_store_root(prefix: &Path) -> Result<PathBuf, StoreError> {
  let trimmed = prefix
    .to_str()
    .ok_or_else(|| StoreError::NonUtf8Prefix(prefix.to_path_buf()))?
    .trim_end_matches(['/', '\\']);
  let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

  let mut root = Path::new(trimmed)
    .join(STORE_VERSION)
    .to_str()
    .ok_or_else(|| StoreError::NonUtf8Prefix(prefix.to_path_buf()))?
    .to_string();

  let max = padded_root_length();
  if root.len() > max {
    return Err(StoreError::PrefixTooLong {
      prefix: prefix.to_path_buf(),
      length: root.len(),
      max,
    });
  }

  while root.len() < max {
    root.push(STORE_PADDING_CHAR);
  }
  Ok(PathBuf::from(root))
}

impl Store {
  pub fn new(path: impl Into<PathBuf>, pretty_path: &str) -> Self {
    Self {
      path: path.into(),
      pretty_path: pretty_path.to_string(),
    }
  }

  /// The global store for a user prefix, with a padded root.
  ///
  /// # Errors
  ///
  /// See [`padded_store_root`].
  pub fn for_prefix(prefix: &Path) -> Result<Self, StoreError> {
    Ok(Self::new(padded_store_root(prefix)?, "%store%"))
  }

  /// The sandbox-local store for mutable packages.
  pub fn local(sandbox: &Path) -> Self {
    Self::new(sandbox.join(SANDBOX_DIR).join("store"), "%localStore%")
  }

  pub fn tree_path(&self, tree: StoreTree) -> PathBuf {
    self.path.join(tree.as_str())
  }

  /// `<root>/<tree>/<build_id>/<segments...>`
  pub fn get_path(&self, tree: StoreTree, build_id: &str, segments: &[&str]) -> PathBuf {
    let mut path = self.tree_path(tree).join(build_id);
    for segment in segments {
      path.push(segment);
    }
    path
  }

  /// Per-task build log.
  pub fn log_path(&self, build_id: &str) -> PathBuf {
    self.tree_path(StoreTree::Build).join(format!("{build_id}.log"))
  }

  /// Whether a finished installation of `build_id` is present.
  ///
  /// # Errors
  ///
  /// Returns an error if the install path cannot be inspected, as opposed
  /// to being absent.
  pub fn has(&self, build_id: &str) -> Result<bool, StoreError> {
    let path = self.get_path(StoreTree::Install, build_id, &[]);
    path.try_exists().map_err(|e| StoreError::io(&path, e))
  }

  /// Async form of [`Store::has`].
  ///
  /// # Errors
  ///
  /// Same as [`Store::has`].
  pub async fn contains(&self, build_id: &str) -> Result<bool, StoreError> {
    let path = self.get_path(StoreTree::Install, build_id, &[]);
    tokio::fs::try_exists(&path).await.map_err(|e| StoreError::io(&path, e))
  }

  /// Create the three subtrees. Safe to call repeatedly.
  ///
  /// # Errors
  ///
  /// Returns an error if a directory cannot be created.
  pub fn init(&self) -> Result<(), StoreError> {
    for tree in StoreTree::ALL {
      let path = self.tree_path(tree);
      std::fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
    }
    debug!(store = ?self.path, "store initialized");
    Ok(())
  }
}
