//! Implementation of the `burrow exec` command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use burrow_lib::build::{BuildOptions, CommandBackend, Orchestrator, TracingReporter};

use super::{GlobalOpts, compile_root};
use crate::output::print_error;

/// Build the dependencies of the root package, then run `command` in the
/// root package's build environment.
///
/// Exits with the command's exit code.
pub fn cmd_exec(graph: &Path, command: &[String], opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(graph)?;
  let root = compile_root(&config, &spec)?;
  let backend = CommandBackend::new();

  let options = BuildOptions {
    build_only_deps: true,
    ..BuildOptions::default()
  };
  let orchestrator = Orchestrator::new(config, backend.clone(), options, Arc::new(TracingReporter));
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

  let outcome = rt.block_on(orchestrator.build(&root)).context("Build failed")?;
  if !outcome.is_success() {
    for error in outcome.failures() {
      print_error(&error.to_string());
    }
    bail!("Dependencies of {} failed to build", root.spec.name);
  }

  let status = rt.block_on(backend.run_interactive(&root, command))?;
  info!(status = %status, "command finished");
  if !status.success() {
    std::process::exit(status.code().unwrap_or(1));
  }
  Ok(())
}
