//! Test utilities for burrow-lib.
//!
//! Builders for small spec graphs shared by unit tests across modules.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::spec::{BuildSpec, BuildType, CommandSpec, ExportedVar, SourceType};

/// Spec with no commands, exports or dependencies.
pub fn spec(name: &str) -> BuildSpec {
  BuildSpec {
    id: format!("{name}-1.0.0-0000"),
    name: name.to_string(),
    version: "1.0.0".to_string(),
    build_command: Vec::new(),
    install_command: Vec::new(),
    exported_env: BTreeMap::new(),
    source_path: PathBuf::from("/src").join(name),
    source_type: SourceType::Immutable,
    build_type: BuildType::OutOfSource,
    dependencies: BTreeMap::new(),
    errors: Vec::new(),
  }
}

pub fn with_deps(mut spec: BuildSpec, deps: &[&Arc<BuildSpec>]) -> BuildSpec {
  for dep in deps {
    spec.dependencies.insert(dep.name.clone(), Arc::clone(dep));
  }
  spec
}

pub fn with_export(mut spec: BuildSpec, name: &str, var: ExportedVar) -> BuildSpec {
  spec.exported_env.insert(name.to_string(), var);
  spec
}

pub fn with_build(mut spec: BuildSpec, commands: &[&str]) -> BuildSpec {
  spec.build_command = commands.iter().map(|c| CommandSpec::Shell((*c).to_string())).collect();
  spec
}
