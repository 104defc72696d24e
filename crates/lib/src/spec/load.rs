//! Spec graph loading.
//!
//! A spec graph is stored as a flat JSON document keyed by id, with
//! dependencies referring to other entries by id:
//!
//! ```json
//! {
//!   "root": "app-1.0.0-1a2b3c4d",
//!   "specs": {
//!     "app-1.0.0-1a2b3c4d": {
//!       "name": "app",
//!       "version": "1.0.0",
//!       "sourcePath": ".",
//!       "sourceType": "root",
//!       "buildCommand": [["dune", "build"]],
//!       "dependencies": { "ocaml": "ocaml-4.14.0-5e6f7a8b" }
//!     }
//!   }
//! }
//! ```
//!
//! Relative source paths are resolved against the directory holding the file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{BuildSpec, BuildType, CommandSpec, ExportedVar, SourceType};

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid spec graph: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("root spec {0} is not defined")]
  MissingRoot(String),

  #[error("spec {id} depends on undefined spec {dependency}")]
  MissingDependency { id: String, dependency: String },

  #[error("dependency cycle through spec {0}")]
  Cycle(String),
}

#[derive(Debug, Deserialize)]
struct SpecGraphFile {
  root: String,
  specs: BTreeMap<String, SpecEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecEntry {
  name: String,
  version: String,
  #[serde(default)]
  build_command: Vec<CommandSpec>,
  #[serde(default)]
  install_command: Vec<CommandSpec>,
  #[serde(default)]
  exported_env: BTreeMap<String, ExportedVar>,
  source_path: PathBuf,
  #[serde(default)]
  source_type: SourceType,
  #[serde(default)]
  build_type: BuildType,
  #[serde(default)]
  dependencies: BTreeMap<String, String>,
  #[serde(default)]
  errors: Vec<String>,
}

/// Load a spec graph from a JSON file and return its root.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, if an id is
/// referenced but not defined, or if the graph contains a cycle.
pub fn load_graph(path: &Path) -> Result<Arc<BuildSpec>, LoadError> {
  let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let parent = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let base_dir = dunce::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
  from_json_str(&content, &base_dir)
}

/// Parse a spec graph from its JSON text.
///
/// # Errors
///
/// See [`load_graph`].
pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Arc<BuildSpec>, LoadError> {
  let file: SpecGraphFile = serde_json::from_str(content)?;
  if !file.specs.contains_key(&file.root) {
    return Err(LoadError::MissingRoot(file.root));
  }

  let mut graph: DiGraph<&str, ()> = DiGraph::new();
  let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
  for id in file.specs.keys() {
    nodes.insert(id.as_str(), graph.add_node(id.as_str()));
  }
  for (id, entry) in &file.specs {
    for dep_id in entry.dependencies.values() {
      let Some(&dep_idx) = nodes.get(dep_id.as_str()) else {
        return Err(LoadError::MissingDependency {
          id: id.clone(),
          dependency: dep_id.clone(),
        });
      };
      // Edge from dependent to dependency
      graph.add_edge(nodes[id.as_str()], dep_idx, ());
    }
  }

  let order = toposort(&graph, None).map_err(|cycle| LoadError::Cycle(graph[cycle.node_id()].to_string()))?;

  // Dependencies come after dependents in `order`, so build from the back.
  let mut built: HashMap<&str, Arc<BuildSpec>> = HashMap::new();
  for idx in order.into_iter().rev() {
    let id = graph[idx];
    let entry = &file.specs[id];
    let mut dependencies = BTreeMap::new();
    for (name, dep_id) in &entry.dependencies {
      if let Some(dep) = built.get(dep_id.as_str()) {
        dependencies.insert(name.clone(), Arc::clone(dep));
      }
    }

    // `components` drops `.` segments, so "." resolves to `base_dir` itself.
    let source_path: PathBuf = if entry.source_path.is_absolute() {
      entry.source_path.components().collect()
    } else {
      base_dir.join(&entry.source_path).components().collect()
    };

    let spec = BuildSpec {
      id: id.to_string(),
      name: entry.name.clone(),
      version: entry.version.clone(),
      build_command: entry.build_command.clone(),
      install_command: entry.install_command.clone(),
      exported_env: entry.exported_env.clone(),
      source_path,
      source_type: entry.source_type,
      build_type: entry.build_type,
      dependencies,
      errors: entry.errors.clone(),
    };
    built.insert(id, Arc::new(spec));
  }

  debug!(specs = built.len(), root = %file.root, "loaded spec graph");

  built.remove(file.root.as_str()).ok_or(LoadError::MissingRoot(file.root))
}
