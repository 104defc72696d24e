//! Implementation of the `burrow export-build` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use burrow_lib::build::import::export_artifact;

use super::{GlobalOpts, compile_root, select_task};
use crate::output::print_success;

/// Pack the installation of the root package, or of `package`, into
/// `<out>/<id>.tar.gz`.
pub fn cmd_export_build(graph: &Path, package: Option<&str>, out: &Path, opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(graph)?;
  let root = compile_root(&config, &spec)?;
  let task = select_task(&root, package)?;

  let store = config.store_for(&task.spec);
  let built = store
    .has(&task.id)
    .with_context(|| format!("Failed to inspect the store for {}", task.id))?;
  if !built {
    bail!("{} is not built yet; run `burrow build` first", task.spec.name);
  }

  let archive = export_artifact(&task.paths.install, &task.id, &store.path, out)
    .with_context(|| format!("Failed to export {}", task.id))?;
  print_success(&format!("Exported {} to {}", task.id, archive.display()));
  Ok(())
}
