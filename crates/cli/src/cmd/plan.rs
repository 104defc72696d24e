//! Implementation of the `burrow plan` command.
//!
//! Prints the compiled task graph with machine-specific paths replaced by
//! `%store%`, `%localStore%` and `%sandbox%`, so plans can be compared
//! across machines.

use std::path::Path;

use anyhow::Result;

use burrow_lib::config::PathStyle;
use burrow_lib::task::plan_json;

use super::{GlobalOpts, compile_root};
use crate::output::print_json;

pub fn cmd_plan(graph: &Path, opts: &GlobalOpts) -> Result<()> {
  let (config, spec) = opts.load(graph)?;
  let config = config.with_style(PathStyle::Symbolic);
  let root = compile_root(&config, &spec)?;
  print_json(&plan_json(&root))
}
