//! Default locations read from the process environment.

use std::env;
use std::path::PathBuf;

use crate::consts::{APP_NAME, IMPORT_PATH_ENV, PREFIX_ENV};

#[cfg(windows)]
const HOME_VARS: &[&str] = &["USERPROFILE", "HOME"];

#[cfg(not(windows))]
const HOME_VARS: &[&str] = &["HOME"];

fn non_empty_var(name: &str) -> Option<String> {
  env::var(name).ok().filter(|value| !value.is_empty())
}

/// Prefix under which the global store lives: `$BURROW_PREFIX`, or
/// `~/.burrow`.
pub fn default_prefix() -> PathBuf {
  if let Some(prefix) = non_empty_var(PREFIX_ENV) {
    return PathBuf::from(prefix);
  }
  let home = HOME_VARS
    .iter()
    .find_map(|name| non_empty_var(name))
    .map(PathBuf::from)
    .unwrap_or_else(env::temp_dir);
  home.join(format!(".{APP_NAME}"))
}

/// Read-only import locations listed in `$BURROW_IMPORT_PATH`, separated
/// like `PATH`.
pub fn default_import_paths() -> Vec<PathBuf> {
  env::var_os(IMPORT_PATH_ENV)
    .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
    .unwrap_or_default()
}
