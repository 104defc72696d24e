use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::GraphNode;

/// Where a package's sources come from, which decides the store it builds into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  /// Sources pinned by content; builds go to the global store and are reused.
  #[default]
  Immutable,
  /// Sources that may change without changing the id (linked checkouts).
  Transient,
  /// The sandbox's own package.
  Root,
}

impl SourceType {
  pub fn is_immutable(self) -> bool {
    matches!(self, SourceType::Immutable)
  }
}

/// How a package's build tree relates to its source tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
  /// The build writes only into its own build directory.
  #[default]
  #[serde(rename = "out-of-source")]
  OutOfSource,
  /// The build writes into its source tree, so sources are copied first.
  #[serde(rename = "in-source")]
  InSource,
  /// The build writes only into `_build` inside the source tree.
  #[serde(rename = "_build")]
  UnderscoreBuild,
}

/// A build or install command before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
  /// A shell line.
  Shell(String),
  /// An argument vector, quoted when rendered.
  Args(Vec<String>),
}

/// Visibility of an exported variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
  /// Visible to direct dependents only.
  #[default]
  Local,
  /// Visible to every transitive dependent.
  Global,
}

/// A variable a package exports to its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportedVar {
  /// Value expression, evaluated against the exporting package's scope.
  #[serde(rename = "val")]
  pub value: String,
  #[serde(default)]
  pub scope: ExportScope,
  #[serde(default)]
  pub exclusive: bool,
}

impl ExportedVar {
  pub fn local(value: &str) -> Self {
    Self {
      value: value.to_string(),
      scope: ExportScope::Local,
      exclusive: false,
    }
  }

  pub fn global(value: &str) -> Self {
    Self {
      value: value.to_string(),
      scope: ExportScope::Global,
      exclusive: false,
    }
  }

  pub fn exclusive(mut self) -> Self {
    self.exclusive = true;
    self
  }
}

/// Immutable description of one package's build.
#[derive(Debug, Clone)]
pub struct BuildSpec {
  /// Content address; equal content yields an equal id.
  pub id: String,
  pub name: String,
  pub version: String,
  pub build_command: Vec<CommandSpec>,
  pub install_command: Vec<CommandSpec>,
  pub exported_env: BTreeMap<String, ExportedVar>,
  pub source_path: PathBuf,
  pub source_type: SourceType,
  pub build_type: BuildType,
  /// Dependencies by package name. Diamonds share one spec per id.
  pub dependencies: BTreeMap<String, Arc<BuildSpec>>,
  /// Soft diagnostics recorded while the graph was crawled.
  pub errors: Vec<String>,
}

impl GraphNode for BuildSpec {
  fn id(&self) -> &str {
    &self.id
  }

  fn dependencies(&self) -> Vec<&Self> {
    self.dependencies.values().map(|d| d.as_ref()).collect()
  }
}

// Lets folds hand out shared handles to the specs they visit.
impl GraphNode for Arc<BuildSpec> {
  fn id(&self) -> &str {
    &self.id
  }

  fn dependencies(&self) -> Vec<&Self> {
    self.dependencies.values().collect()
  }
}

impl BuildSpec {
  /// Names of the direct dependencies, space separated.
  pub fn dependency_names(&self) -> String {
    self.dependencies.keys().cloned().collect::<Vec<_>>().join(" ")
  }
}
