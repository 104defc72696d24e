mod build;
mod build_env;
mod exec;
mod export_build;
mod ls_builds;
mod plan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use burrow_lib::config::Config;
use burrow_lib::graph::traverse;
use burrow_lib::platform::paths::default_prefix;
use burrow_lib::spec::BuildSpec;
use burrow_lib::spec::load::load_graph;
use burrow_lib::task::{BuildTask, compile};
use tracing::debug;

pub use build::{BuildArgs, cmd_build};
pub use build_env::cmd_build_env;
pub use exec::cmd_exec;
pub use export_build::cmd_export_build;
pub use ls_builds::cmd_ls_builds;
pub use plan::cmd_plan;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
  pub prefix: Option<PathBuf>,
  pub sandbox: Option<PathBuf>,
  pub import_paths: Vec<PathBuf>,
}

impl GlobalOpts {
  /// Load the spec graph at `graph` and the configuration to build it with.
  ///
  /// The sandbox defaults to the directory holding the graph file.
  pub fn load(&self, graph: &Path) -> Result<(Config, Arc<BuildSpec>)> {
    let root = load_graph(graph).with_context(|| format!("Failed to load spec graph: {}", graph.display()))?;

    let sandbox = match &self.sandbox {
      Some(dir) => dir.clone(),
      None => graph
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")),
    };
    let sandbox =
      dunce::canonicalize(&sandbox).with_context(|| format!("Sandbox not found: {}", sandbox.display()))?;
    let prefix = self.prefix.clone().unwrap_or_else(default_prefix);

    let mut config = Config::new(&prefix, &sandbox).context("Failed to set up store")?;
    if !self.import_paths.is_empty() {
      config = config.with_import_paths(self.import_paths.clone());
    }
    debug!(
      store = ?config.store.path,
      sandbox = ?config.sandbox_path,
      platform = %config.platform,
      "loaded configuration"
    );
    Ok((config, root))
  }
}

pub fn compile_root(config: &Config, root: &Arc<BuildSpec>) -> Result<Arc<BuildTask>> {
  Ok(compile(root, config, &[])?)
}

/// The task of the package named `name`, or the root task.
pub fn select_task(root: &Arc<BuildTask>, name: Option<&str>) -> Result<Arc<BuildTask>> {
  let Some(name) = name else {
    return Ok(Arc::clone(root));
  };
  let mut found = None;
  traverse(root, |task: &Arc<BuildTask>| {
    if found.is_none() && task.spec.name == name {
      found = Some(Arc::clone(task));
    }
  });
  match found {
    Some(task) => Ok(task),
    None => bail!("No package named {name} in the graph"),
  }
}
