//! Implementation of the `burrow build-env` command.

use std::path::Path;

use anyhow::Result;

use burrow_lib::env::{render_sh, to_json};

use super::{GlobalOpts, compile_root, select_task};
use crate::output::print_json;

/// Print the build environment of the root package, or of `package`.
pub fn cmd_build_env(graph: &Path, package: Option<&str>, json: bool, opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(graph)?;
  let root = compile_root(&config, &spec)?;
  let task = select_task(&root, package)?;

  if json {
    print_json(&to_json(&task.env))?;
  } else {
    print!("{}", render_sh(&task.env));
  }
  Ok(())
}
