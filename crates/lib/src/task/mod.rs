//! Build tasks: specs with their environment and commands fully evaluated.
//!
//! A [`BuildTask`] is what the orchestrator executes. It is produced from a
//! [`BuildSpec`] graph by [`TaskCompiler`], which evaluates every exported
//! variable and command expression against package scopes and assembles the
//! build environment from the package's dependencies.

mod compile;
mod scope;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::env::{EnvironmentBinding, to_json};
use crate::graph::{GraphNode, traverse};
use crate::spec::BuildSpec;

pub use compile::{CompileError, CompileFailure, TaskCompiler, compile, quote_arg};
pub use scope::{Scope, ScopeEntry, ScopeEvaluator};

/// Locations a task reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPaths {
  pub source: PathBuf,
  /// Working directory of the commands.
  pub root: PathBuf,
  pub build: PathBuf,
  /// Install destination while the build runs.
  pub stage: PathBuf,
  /// Final install location.
  pub install: PathBuf,
  pub log: PathBuf,
}

/// An executable build.
#[derive(Debug, Clone)]
pub struct BuildTask {
  pub id: String,
  pub spec: Arc<BuildSpec>,
  /// Ordered environment the commands run in.
  pub env: Vec<EnvironmentBinding>,
  /// Scope the commands were evaluated against.
  pub scope: Scope,
  pub build_command: Vec<String>,
  pub install_command: Vec<String>,
  pub dependencies: BTreeMap<String, Arc<BuildTask>>,
  pub paths: TaskPaths,
  pub errors: Vec<String>,
}

impl GraphNode for BuildTask {
  fn id(&self) -> &str {
    &self.id
  }

  fn dependencies(&self) -> Vec<&Self> {
    self.dependencies.values().map(|d| d.as_ref()).collect()
  }
}

impl GraphNode for Arc<BuildTask> {
  fn id(&self) -> &str {
    &self.id
  }

  fn dependencies(&self) -> Vec<&Self> {
    self.dependencies.values().collect()
  }
}

impl BuildTask {
  /// JSON description of this task alone.
  pub fn to_json(&self) -> Value {
    json!({
      "id": self.id,
      "name": self.spec.name,
      "version": self.spec.version,
      "sourceType": self.spec.source_type,
      "buildType": self.spec.build_type,
      "paths": self.paths,
      "env": to_json(&self.env),
      "buildCommand": self.build_command,
      "installCommand": self.install_command,
      "dependencies": self
        .dependencies
        .iter()
        .map(|(name, dep)| (name.clone(), Value::String(dep.id.clone())))
        .collect::<serde_json::Map<_, _>>(),
      "errors": self.errors,
    })
  }
}

/// JSON description of the whole task graph under `root`.
pub fn plan_json(root: &BuildTask) -> Value {
  let mut tasks = serde_json::Map::new();
  traverse(root, |task| {
    tasks.insert(task.id.clone(), task.to_json());
  });
  json!({ "root": root.id, "tasks": tasks })
}
