//! Implementation of the `burrow ls-builds` command.
//!
//! Lists every package of the graph, dependencies first, with the
//! location of its installation and whether the store already has it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use burrow_lib::graph::traverse_deep_first;
use burrow_lib::task::BuildTask;

use super::{GlobalOpts, compile_root};
use crate::output::{PackageStatus, print_json, print_package};

#[derive(Debug, Serialize)]
struct BuildEntry {
  id: String,
  name: String,
  version: String,
  install: PathBuf,
  built: bool,
}

pub fn cmd_ls_builds(graph: &Path, json: bool, opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(graph)?;
  let root = compile_root(&config, &spec)?;

  let mut tasks = Vec::new();
  traverse_deep_first(&root, |task: &Arc<BuildTask>| tasks.push(Arc::clone(task)));

  let mut listed = Vec::with_capacity(tasks.len());
  for task in tasks {
    let built = config
      .store_for(&task.spec)
      .has(&task.id)
      .with_context(|| format!("Failed to inspect the store for {}", task.id))?;
    listed.push((task, built));
  }

  if json {
    let entries: Vec<BuildEntry> = listed
      .iter()
      .map(|(task, built)| BuildEntry {
        id: task.id.clone(),
        name: task.spec.name.clone(),
        version: task.spec.version.clone(),
        install: task.paths.install.clone(),
        built: *built,
      })
      .collect();
    return print_json(&entries);
  }

  for (task, built) in &listed {
    let status = if *built {
      PackageStatus::Installed
    } else {
      PackageStatus::Missing
    };
    print_package(task, status, Some(task.paths.install.as_path()));
  }
  Ok(())
}
