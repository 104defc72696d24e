//! Driving a task graph to completion.
//!
//! Every task gets its own tokio task, spawned as the graph is folded. A
//! task first waits for the outcome of its direct dependencies, then decides
//! whether it is up to date, can be imported, or must be built. Independent
//! branches proceed concurrently; the only bound is the queue in front of
//! the build backend.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::backend::BuildBackend;
use super::import::{ImportSource, find_import, import_artifact};
use super::report::{BuildEvent, Reporter};
use super::single_flight::SingleFlight;
use super::types::{BuildError, BuildOptions, BuildOutcome, BuildState};
use crate::config::Config;
use crate::consts::{SANDBOX_DIR, UNDERSCORE_BUILD_DIR};
use crate::graph::{DepMap, topological_fold};
use crate::spec::SourceType;
use crate::store::StoreError;
use crate::task::BuildTask;
use crate::util::fs::replace_symlink;
use crate::util::hash::checksum_tree;

/// Entries of a source tree that do not count as sources.
const CHECKSUM_EXCLUDES: &[&str] = &[SANDBOX_DIR, UNDERSCORE_BUILD_DIR, "node_modules"];

type Performed = Result<(), Arc<BuildError>>;

/// Builds task graphs against the stores of one [`Config`].
///
/// Real builds and imports are deduplicated by task id within one call to
/// [`build`]. Each call starts from the stores alone, so transient and root
/// tasks are built again on every call.
///
/// [`build`]: Orchestrator::build
pub struct Orchestrator<B: BuildBackend> {
  inner: Arc<Inner<B>>,
}

struct Inner<B> {
  config: Config,
  backend: B,
  options: BuildOptions,
  reporter: Arc<dyn Reporter>,
  queue: Semaphore,
}

impl<B: BuildBackend> Orchestrator<B> {
  pub fn new(config: Config, backend: B, options: BuildOptions, reporter: Arc<dyn Reporter>) -> Self {
    let queue = Semaphore::new(options.parallelism.max(1));
    Self {
      inner: Arc::new(Inner {
        config,
        backend,
        options,
        reporter,
        queue,
      }),
    }
  }

  /// Build `root` and everything it depends on.
  ///
  /// Build failures are part of the outcome, not errors.
  ///
  /// # Errors
  ///
  /// Returns an error only if the stores cannot be initialised.
  #[instrument(skip_all, fields(root = %root.id))]
  pub async fn build(&self, root: &Arc<BuildTask>) -> Result<BuildOutcome, StoreError> {
    self.inner.config.init_stores()?;
    info!(parallelism = self.inner.options.parallelism, "starting build");

    let flights: Arc<SingleFlight<Performed>> = Arc::new(SingleFlight::new());
    let states: Arc<Mutex<BTreeMap<String, BuildState>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();

    topological_fold(
      root,
      |direct: &DepMap<watch::Receiver<BuildState>>, _, task: &Arc<BuildTask>| {
        let (tx, rx) = watch::channel(BuildState::InProgress);
        let deps: Vec<watch::Receiver<BuildState>> = direct.values().cloned().collect();
        let inner = Arc::clone(&self.inner);
        let flights = Arc::clone(&flights);
        let task = Arc::clone(task);
        let is_root = task.id == root.id;
        let states = Arc::clone(&states);

        lock(&states).insert(task.id.clone(), BuildState::InProgress);
        let id = task.id.clone();
        let handle = tokio::spawn(async move {
          let state = inner.build_node(&flights, &task, deps, is_root).await;
          inner.reporter.report(&BuildEvent::Finished {
            task: Arc::clone(&task),
            state: state.clone(),
          });
          lock(&states).insert(task.id.clone(), state.clone());
          tx.send_replace(state);
        });
        handles.push((id, handle));
        rx
      },
    );

    for (id, handle) in handles {
      if let Err(e) = handle.await {
        lock(&states).insert(id.clone(), BuildState::failure(BuildError::internal(&id, e)));
      }
    }

    let states = std::mem::take(&mut *lock(&states));
    let outcome = BuildOutcome {
      root: root.id.clone(),
      states,
    };
    info!(
      built = outcome.built(),
      cached = outcome.cached(),
      failed = outcome.failed(),
      "build finished"
    );
    Ok(outcome)
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(id: &str, work: F) -> Result<T, BuildError>
where
  F: FnOnce() -> std::io::Result<T> + Send + 'static,
  T: Send + 'static,
{
  match tokio::task::spawn_blocking(work).await {
    Ok(result) => result.map_err(|e| BuildError::internal(id, e)),
    Err(e) => Err(BuildError::internal(id, e)),
  }
}

impl<B: BuildBackend> Inner<B> {
  async fn build_node(
    self: &Arc<Self>,
    flights: &SingleFlight<Performed>,
    task: &Arc<BuildTask>,
    deps: Vec<watch::Receiver<BuildState>>,
    is_root: bool,
  ) -> BuildState {
    if is_root && self.options.build_only_deps {
      return BuildState::cached();
    }

    let mut failed: Vec<Arc<BuildError>> = Vec::new();
    let mut forced = is_root && self.options.force_root;
    for mut rx in deps {
      let state = match rx.wait_for(BuildState::is_finished).await {
        Ok(state) => state.clone(),
        Err(_) => BuildState::failure(BuildError::internal(&task.id, "a dependency was aborted")),
      };
      match state {
        BuildState::Failure { error } => failed.push(error),
        BuildState::Success { forced: true, .. } => forced = true,
        _ => {}
      }
    }
    if !failed.is_empty() {
      return BuildState::failure(BuildError::Dependency {
        id: task.id.clone(),
        failed,
      });
    }

    let state = if forced {
      self.real_build(flights, task, true).await
    } else {
      match task.spec.source_type {
        SourceType::Immutable => match self.config.store_for(&task.spec).contains(&task.id).await {
          Ok(true) => {
            debug!(id = %task.id, "found in store");
            BuildState::cached()
          }
          Ok(false) => self.real_build(flights, task, false).await,
          Err(e) => BuildState::failure(BuildError::internal(&task.id, e)),
        },
        SourceType::Transient | SourceType::Root => {
          let unchanged = if self.options.skip_unchanged_transient {
            self.source_unchanged(task).await
          } else {
            Ok(false)
          };
          match unchanged {
            Ok(true) => {
              debug!(id = %task.id, "sources unchanged since last build");
              BuildState::cached()
            }
            Ok(false) => self.real_build(flights, task, true).await,
            Err(e) => BuildState::failure(BuildError::internal(&task.id, e)),
          }
        }
      }
    };

    if is_root && state.is_success() {
      self.link_root(task).await;
    }
    state
  }

  async fn real_build(
    self: &Arc<Self>,
    flights: &SingleFlight<Performed>,
    task: &Arc<BuildTask>,
    forced: bool,
  ) -> BuildState {
    let started = Instant::now();
    let result = flights
      .run(&task.id, || {
        let inner = Arc::clone(self);
        let task = Arc::clone(task);
        async move { inner.perform(task, forced).await }
      })
      .await;

    match result {
      Ok(()) => BuildState::Success {
        time_elapsed: started.elapsed(),
        cached: false,
        forced,
      },
      Err(error) => BuildState::Failure { error },
    }
  }

  async fn perform(&self, task: Arc<BuildTask>, forced: bool) -> Performed {
    self.reporter.report(&BuildEvent::Started { task: Arc::clone(&task) });

    let import = if !forced && task.spec.source_type.is_immutable() {
      find_import(&self.config.import_paths, &task.id)
    } else {
      None
    };

    match import {
      Some(source) => self.import(&task, source).await?,
      None => {
        let _permit = self
          .queue
          .acquire()
          .await
          .map_err(|e| Arc::new(BuildError::internal(&task.id, e)))?;
        self.backend.build(Arc::clone(&task), Arc::clone(&self.reporter)).await?;
      }
    }

    if self.options.skip_unchanged_transient && !task.spec.source_type.is_immutable() {
      self.record_checksum(&task).await;
    }
    Ok(())
  }

  async fn import(&self, task: &Arc<BuildTask>, source: ImportSource) -> Performed {
    let store_root = self.config.store_for(&task.spec).path.clone();
    let stage = task.paths.stage.clone();
    let install = task.paths.install.clone();
    let id = task.id.clone();

    tokio::task::spawn_blocking(move || import_artifact(&source, &store_root, &stage, &install))
      .await
      .map_err(|e| Arc::new(BuildError::internal(&id, e)))?
      .map_err(|e| Arc::new(BuildError::internal(&id, e)))?;

    let present = self
      .config
      .store_for(&task.spec)
      .contains(&task.id)
      .await
      .map_err(|e| Arc::new(BuildError::internal(&task.id, e)))?;
    if !present {
      return Err(Arc::new(BuildError::internal(
        &task.id,
        "import finished but the installation is missing",
      )));
    }
    Ok(())
  }

  fn checksum_path(task: &BuildTask) -> PathBuf {
    task.paths.log.with_file_name(format!("{}.checksum", task.id))
  }

  async fn source_checksum(task: &BuildTask) -> Option<String> {
    let source = task.paths.source.clone();
    tokio::task::spawn_blocking(move || checksum_tree(&source, CHECKSUM_EXCLUDES))
      .await
      .ok()?
      .ok()
  }

  /// Whether the task is installed and its sources match the checksum
  /// recorded by its last build. A missing checksum counts as changed.
  async fn source_unchanged(&self, task: &BuildTask) -> Result<bool, StoreError> {
    if !self.config.store_for(&task.spec).contains(&task.id).await? {
      return Ok(false);
    }
    let Ok(recorded) = tokio::fs::read_to_string(Self::checksum_path(task)).await else {
      return Ok(false);
    };
    Ok(
      Self::source_checksum(task)
        .await
        .is_some_and(|current| current == recorded.trim()),
    )
  }

  async fn record_checksum(&self, task: &BuildTask) {
    let Some(checksum) = Self::source_checksum(task).await else {
      return;
    };
    if let Err(e) = tokio::fs::write(Self::checksum_path(task), checksum).await {
      warn!(id = %task.id, error = %e, "failed to record source checksum");
    }
  }

  /// Point `_burrow/build` and `_burrow/install` in the sandbox at the root
  /// task's directories.
  async fn link_root(&self, task: &BuildTask) {
    let dir = self.config.sandbox_path.join(SANDBOX_DIR);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
      warn!(dir = ?dir, error = %e, "failed to create sandbox directory");
      return;
    }
    for (name, target) in [("build", &task.paths.build), ("install", &task.paths.install)] {
      let link = dir.join(name);
      let (target, at) = (target.clone(), link.clone());
      if let Err(e) = blocking(&task.id, move || replace_symlink(&target, &at)).await {
        warn!(link = ?link, error = %e, "failed to update convenience link");
      }
    }
  }
}
