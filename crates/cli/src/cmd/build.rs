//! Implementation of the `burrow build` command.
//!
//! Compiles the spec graph into tasks and drives them through the
//! orchestrator, then prints one line per package and the root causes of
//! any failure.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;

use burrow_lib::build::{
  BuildEvent, BuildOptions, BuildOutcome, CommandBackend, Orchestrator, Reporter, TracingReporter,
};
use burrow_lib::graph::traverse_deep_first;
use burrow_lib::task::BuildTask;

use super::{GlobalOpts, compile_root};
use crate::output::{
  PackageStatus, format_elapsed, print_build_error, print_building, print_package, print_stat, print_success,
};

#[derive(Args, Debug)]
pub struct BuildArgs {
  /// Path to the spec graph
  pub graph: std::path::PathBuf,

  /// Build the dependencies of the root package but not the package itself
  #[arg(long)]
  pub only_deps: bool,

  /// Rebuild the root package even if it looks up to date
  #[arg(short, long)]
  pub force: bool,

  /// Skip linked packages whose sources did not change since their last build
  #[arg(long)]
  pub skip_unchanged: bool,

  /// Maximum number of build commands to run at once (default: number of CPUs)
  #[arg(short, long, value_name = "N")]
  pub jobs: Option<usize>,
}

/// Prints a line to stderr whenever a real build starts.
struct ProgressReporter;

impl Reporter for ProgressReporter {
  fn report(&self, event: &BuildEvent) {
    if let BuildEvent::Started { task } = event {
      print_building(task);
    }
    TracingReporter.report(event);
  }
}

pub fn cmd_build(args: BuildArgs, opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(&args.graph)?;
  let root = compile_root(&config, &spec)?;

  let mut options = BuildOptions {
    build_only_deps: args.only_deps,
    force_root: args.force,
    skip_unchanged_transient: args.skip_unchanged,
    ..BuildOptions::default()
  };
  if let Some(jobs) = args.jobs {
    options.parallelism = jobs.max(1);
  }

  let orchestrator = Orchestrator::new(config, CommandBackend::new(), options, Arc::new(ProgressReporter));
  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(orchestrator.build(&root)).context("Build failed")?;
  let elapsed = started.elapsed();

  print_summary(&root, &outcome, args.only_deps);
  println!();
  print_stat("Built", &outcome.built().to_string());
  print_stat("Cached", &outcome.cached().to_string());
  print_stat("Time", &format_elapsed(elapsed));

  if !outcome.is_success() {
    println!();
    for error in outcome.failures() {
      print_build_error(&error);
    }
    bail!("Build of {} failed", root.spec.name);
  }

  println!();
  if args.only_deps {
    print_success(&format!("Dependencies of {} are ready", root.spec.name));
  } else {
    print_success(&format!("{}@{} is ready", root.spec.name, root.spec.version));
    print_stat("Install", &root.paths.install.display().to_string());
  }
  Ok(())
}

fn print_summary(root: &Arc<BuildTask>, outcome: &BuildOutcome, only_deps: bool) {
  traverse_deep_first(root, |task: &Arc<BuildTask>| {
    if only_deps && task.id == root.id {
      return;
    }
    print_package(task, PackageStatus::from_state(outcome.states.get(&task.id)), None);
  });
}
