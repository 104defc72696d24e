//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burrow_lib::config::Config;
use burrow_lib::spec::BuildSpec;
use burrow_lib::spec::load::load_graph;
use tempfile::TempDir;

/// A sandbox with its own store prefix, both inside one temporary directory.
pub struct Sandbox {
  pub temp: TempDir,
}

impl Sandbox {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// The sandbox directory, canonicalized so paths compare equal to the
  /// ones the loader resolves.
  pub fn path(&self) -> PathBuf {
    let p = self.temp.path().join("sandbox");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn prefix(&self) -> PathBuf {
    self.temp.path().join("prefix")
  }

  /// Write a file relative to the sandbox.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Write `graph.json` into the sandbox and load it.
  pub fn load(&self, graph: &str) -> Arc<BuildSpec> {
    let path = self.write_file("graph.json", graph);
    load_graph(&path).unwrap()
  }

  pub fn config(&self) -> Config {
    Config::new(&self.prefix(), &self.path())
      .unwrap()
      .with_import_paths(Vec::new())
  }
}

pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}
