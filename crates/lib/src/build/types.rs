//! Types for build orchestration.
//!
//! This module defines the per-task build states, the build error taxonomy,
//! the options an orchestrator run is configured with, and the aggregated
//! outcome of a run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// State of one task within an orchestrator run.
#[derive(Debug, Clone)]
pub enum BuildState {
  InProgress,
  Success {
    time_elapsed: Duration,
    /// No work was done: the artifact was already present.
    cached: bool,
    /// The task was rebuilt even if its artifact was present, because its
    /// sources are mutable or a dependency was rebuilt.
    forced: bool,
  },
  Failure {
    error: Arc<BuildError>,
  },
}

impl BuildState {
  pub fn cached() -> Self {
    BuildState::Success {
      time_elapsed: Duration::ZERO,
      cached: true,
      forced: false,
    }
  }

  pub fn failure(error: BuildError) -> Self {
    BuildState::Failure { error: Arc::new(error) }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, BuildState::Success { .. })
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, BuildState::Failure { .. })
  }

  pub fn is_finished(&self) -> bool {
    !matches!(self, BuildState::InProgress)
  }

  pub fn is_cached(&self) -> bool {
    matches!(self, BuildState::Success { cached: true, .. })
  }

  pub fn is_forced(&self) -> bool {
    matches!(self, BuildState::Success { forced: true, .. })
  }
}

/// Errors that can occur while building a task.
#[derive(Debug, Error)]
pub enum BuildError {
  /// A build or install command exited unsuccessfully.
  #[error("build of {id} failed: {message} (log: {})", .log_path.display())]
  Command {
    id: String,
    log_path: PathBuf,
    message: String,
  },

  /// Something other than the package's own commands went wrong.
  #[error("internal error while building {id}: {message}")]
  Internal { id: String, message: String },

  /// One or more dependencies failed, so the task was not attempted.
  #[error("{id} was not built because {} of its dependencies failed", .failed.len())]
  Dependency { id: String, failed: Vec<Arc<BuildError>> },

  /// A command run interactively in a build environment failed.
  #[error("interactive command failed: {message}")]
  Interactive { message: String },
}

impl BuildError {
  pub fn internal(id: &str, message: impl std::fmt::Display) -> Self {
    BuildError::Internal {
      id: id.to_string(),
      message: message.to_string(),
    }
  }

  /// The root causes behind this error, with dependency failures unwrapped
  /// and each distinct error listed once.
  pub fn flatten(self: &Arc<Self>) -> Vec<Arc<BuildError>> {
    let mut out: Vec<Arc<BuildError>> = Vec::new();
    collect_leaves(self, &mut out);
    out
  }
}

fn collect_leaves(error: &Arc<BuildError>, out: &mut Vec<Arc<BuildError>>) {
  match error.as_ref() {
    BuildError::Dependency { failed, .. } => {
      for child in failed {
        collect_leaves(child, out);
      }
    }
    _ => {
      if !out.iter().any(|seen| Arc::ptr_eq(seen, error)) {
        out.push(Arc::clone(error));
      }
    }
  }
}

/// Configuration for an orchestrator run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Maximum number of build commands running at once.
  pub parallelism: usize,

  /// Build the dependencies of the root task but not the root itself.
  pub build_only_deps: bool,

  /// Rebuild the root task even if it looks up to date.
  pub force_root: bool,

  /// Skip rebuilding transient and root tasks whose sources are unchanged
  /// since their last successful build.
  pub skip_unchanged_transient: bool,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      build_only_deps: false,
      force_root: false,
      skip_unchanged_transient: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Final state of every task reached by one orchestrator run.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
  pub root: String,
  pub states: BTreeMap<String, BuildState>,
}

impl BuildOutcome {
  pub fn root_state(&self) -> Option<&BuildState> {
    self.states.get(&self.root)
  }

  /// Returns true if every task succeeded.
  pub fn is_success(&self) -> bool {
    self.states.values().all(BuildState::is_success)
  }

  /// Root causes of every failure, each listed once.
  pub fn failures(&self) -> Vec<Arc<BuildError>> {
    let mut out: Vec<Arc<BuildError>> = Vec::new();
    for state in self.states.values() {
      if let BuildState::Failure { error } = state {
        for leaf in error.flatten() {
          if !out.iter().any(|seen| Arc::ptr_eq(seen, &leaf)) {
            out.push(leaf);
          }
        }
      }
    }
    out
  }

  /// Tasks whose commands actually ran or that were imported.
  pub fn built(&self) -> usize {
    self
      .states
      .values()
      .filter(|s| matches!(s, BuildState::Success { cached: false, .. }))
      .count()
  }

  pub fn cached(&self) -> usize {
    self.states.values().filter(|s| s.is_cached()).count()
  }

  pub fn failed(&self) -> usize {
    self.states.values().filter(|s| s.is_failure()).count()
  }
}
