//! Progress reporting for orchestrator runs.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::types::BuildState;
use crate::task::BuildTask;

/// A state transition or output line of one task.
#[derive(Debug, Clone)]
pub enum BuildEvent {
  Started { task: Arc<BuildTask> },
  Output { task: Arc<BuildTask>, line: String },
  Finished { task: Arc<BuildTask>, state: BuildState },
}

/// Receives build events as they happen.
///
/// Called from many tasks at once, so implementations must not block.
pub trait Reporter: Send + Sync {
  fn report(&self, event: &BuildEvent);
}

/// Reports through `tracing`: transitions at info, output at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn report(&self, event: &BuildEvent) {
    match event {
      BuildEvent::Started { task } => {
        info!(id = %task.id, "building {}@{}", task.spec.name, task.spec.version);
      }
      BuildEvent::Output { task, line } => {
        debug!(id = %task.id, "{line}");
      }
      BuildEvent::Finished { task, state } => match state {
        BuildState::Success {
          time_elapsed,
          cached: false,
          forced,
        } => {
          info!(id = %task.id, elapsed = ?time_elapsed, forced, "built {}", task.spec.name);
        }
        BuildState::Success { cached: true, .. } => {
          debug!(id = %task.id, "{} is up to date", task.spec.name);
        }
        BuildState::Failure { error } => {
          error!(id = %task.id, "{error}");
        }
        BuildState::InProgress => {}
      },
    }
  }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
  fn report(&self, _event: &BuildEvent) {}
}
