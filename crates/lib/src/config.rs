//! Build configuration: where things live.
//!
//! [`Config`] is a set of pure path-generation functions parameterised by the
//! global store, the sandbox-local store, the sandbox root and the build
//! platform. With [`PathStyle::Symbolic`] every root is replaced by its
//! placeholder (`%store%`, `%localStore%`, `%sandbox%`), so the same spec graph
//! compiles into a portable plan instead of a machine-specific one.

use std::path::{Path, PathBuf};

use crate::consts::UNDERSCORE_BUILD_DIR;
use crate::platform::Platform;
use crate::platform::paths::default_import_paths;
use crate::spec::{BuildSpec, BuildType, SourceType};
use crate::store::{Store, StoreError, StoreTree};

const SANDBOX_PLACEHOLDER: &str = "%sandbox%";

/// How store and sandbox roots are spelled in generated paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathStyle {
  /// Real filesystem paths.
  #[default]
  Concrete,
  /// Placeholders for every root.
  Symbolic,
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Store for immutable packages, shared between sandboxes.
  pub store: Store,
  /// Store for transient and root packages of this sandbox.
  pub local_store: Store,
  pub sandbox_path: PathBuf,
  pub platform: Platform,
  /// Read-only locations searched for prebuilt artifacts.
  pub import_paths: Vec<PathBuf>,
  pub style: PathStyle,
}

impl Config {
  /// Configuration for a sandbox with the global store under `prefix`.
  ///
  /// # Errors
  ///
  /// Returns an error if `prefix` is too long for a padded store root.
  pub fn new(prefix: &Path, sandbox_path: &Path) -> Result<Self, StoreError> {
    Ok(Self {
      store: Store::for_prefix(prefix)?,
      local_store: Store::local(sandbox_path),
      sandbox_path: sandbox_path.to_path_buf(),
      platform: Platform::default(),
      import_paths: default_import_paths(),
      style: PathStyle::Concrete,
    })
  }

  pub fn with_import_paths(mut self, import_paths: Vec<PathBuf>) -> Self {
    self.import_paths = import_paths;
    self
  }

  pub fn with_style(mut self, style: PathStyle) -> Self {
    self.style = style;
    self
  }

  /// Store a spec builds into, decided by its source type.
  pub fn store_for(&self, spec: &BuildSpec) -> &Store {
    match spec.source_type {
      SourceType::Immutable => &self.store,
      SourceType::Transient | SourceType::Root => &self.local_store,
    }
  }

  fn store_path(&self, spec: &BuildSpec, tree: StoreTree) -> PathBuf {
    let store = self.store_for(spec);
    let root = match self.style {
      PathStyle::Concrete => store.path.clone(),
      PathStyle::Symbolic => PathBuf::from(&store.pretty_path),
    };
    root.join(tree.as_str()).join(&spec.id)
  }

  /// Where the package's sources are.
  pub fn source_path(&self, spec: &BuildSpec) -> PathBuf {
    match (self.style, spec.source_path.strip_prefix(&self.sandbox_path)) {
      (PathStyle::Symbolic, Ok(rel)) if rel.as_os_str().is_empty() => PathBuf::from(SANDBOX_PLACEHOLDER),
      (PathStyle::Symbolic, Ok(rel)) => PathBuf::from(SANDBOX_PLACEHOLDER).join(rel),
      _ => spec.source_path.clone(),
    }
  }

  /// Where the build runs and writes intermediate artifacts.
  pub fn build_path(&self, spec: &BuildSpec) -> PathBuf {
    match (spec.source_type, spec.build_type) {
      (SourceType::Root, BuildType::UnderscoreBuild) => self.source_path(spec).join(UNDERSCORE_BUILD_DIR),
      _ => self.store_path(spec, StoreTree::Build),
    }
  }

  /// Working directory of the build: the sources, or a copy of them for
  /// in-source builds.
  pub fn root_path(&self, spec: &BuildSpec) -> PathBuf {
    match spec.build_type {
      BuildType::InSource => self.build_path(spec),
      BuildType::OutOfSource | BuildType::UnderscoreBuild => self.source_path(spec),
    }
  }

  /// Where the install step writes while the build is in progress.
  pub fn stage_path(&self, spec: &BuildSpec) -> PathBuf {
    self.store_path(spec, StoreTree::Stage)
  }

  /// Where the finished installation lives.
  pub fn install_path(&self, spec: &BuildSpec) -> PathBuf {
    self.store_path(spec, StoreTree::Install)
  }

  /// Per-task log file, next to the build directory.
  pub fn log_path(&self, spec: &BuildSpec) -> PathBuf {
    let mut path = self.store_path(spec, StoreTree::Build).into_os_string();
    path.push(".log");
    PathBuf::from(path)
  }

  /// Create the subtrees of both stores. Safe to call repeatedly.
  ///
  /// # Errors
  ///
  /// Returns an error if a directory cannot be created.
  pub fn init_stores(&self) -> Result<(), StoreError> {
    self.store.init()?;
    self.local_store.init()
  }
}
