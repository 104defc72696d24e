//! Terminal output for burrow commands.
//!
//! Package lines, summary stats and failure reports share one set of
//! markers so `build`, `ls-builds` and `export-build` read alike.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use burrow_lib::build::{BuildError, BuildState};
use burrow_lib::task::BuildTask;

/// Lines of a failed command's log shown under its error.
const LOG_TAIL_LINES: usize = 10;

/// How a package ended up after a build, or where it stands in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
  Built(Duration),
  Cached,
  Failed,
  Installed,
  Missing,
}

impl PackageStatus {
  pub fn from_state(state: Option<&BuildState>) -> Self {
    match state {
      Some(BuildState::Success { cached: true, .. }) => Self::Cached,
      Some(BuildState::Success { time_elapsed, .. }) => Self::Built(*time_elapsed),
      Some(BuildState::Failure { .. }) => Self::Failed,
      Some(BuildState::InProgress) | None => Self::Missing,
    }
  }

  fn marker(self) -> String {
    let stdout = Stream::Stdout;
    match self {
      Self::Built(_) | Self::Installed => "✓".if_supports_color(stdout, |s| s.green()).to_string(),
      Self::Cached => "•".if_supports_color(stdout, |s| s.dimmed()).to_string(),
      Self::Failed => "✗".if_supports_color(stdout, |s| s.red()).to_string(),
      Self::Missing => "-".if_supports_color(stdout, |s| s.dimmed()).to_string(),
    }
  }

  fn note(self) -> Option<String> {
    match self {
      Self::Built(elapsed) => Some(format!("(built in {})", format_elapsed(elapsed))),
      Self::Cached => Some("(cached)".to_string()),
      _ => None,
    }
  }
}

/// `name@version` of a task.
pub fn label(task: &BuildTask) -> String {
  format!("{}@{}", task.spec.name, task.spec.version)
}

/// One indented line per package, with an optional dimmed detail such as
/// its install path.
pub fn print_package(task: &BuildTask, status: PackageStatus, detail: Option<&Path>) {
  let mut line = format!("  {} {}", status.marker(), label(task));
  if let Some(note) = status.note() {
    line.push_str(&format!(" {}", note.if_supports_color(Stream::Stdout, |s| s.dimmed())));
  }
  if let Some(path) = detail {
    line.push_str(&format!(" {}", path.display().if_supports_color(Stream::Stdout, |s| s.dimmed())));
  }
  println!("{line}");
}

/// Announce that a real build of `task` started.
pub fn print_building(task: &BuildTask) {
  eprintln!(
    "{} building {}",
    "→".if_supports_color(Stream::Stderr, |s| s.cyan()),
    label(task)
  );
}

/// Durations rounded to milliseconds, e.g. `1s 250ms`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let rounded = Duration::from_millis(elapsed.as_millis().try_into().unwrap_or(u64::MAX));
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  println!("{} {}", "✓".if_supports_color(Stream::Stdout, |s| s.green()), message);
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    "✗".if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Report a leaf build error, followed by the end of its log when a command
/// failed.
pub fn print_build_error(error: &BuildError) {
  print_error(&error.to_string());
  let BuildError::Command { log_path, .. } = error else {
    return;
  };
  let Ok(log) = std::fs::read_to_string(log_path) else {
    return;
  };
  for line in log_tail(&log, LOG_TAIL_LINES) {
    eprintln!("    {}", line.if_supports_color(Stream::Stderr, |s| s.dimmed()));
  }
}

fn log_tail(log: &str, count: usize) -> Vec<&str> {
  let mut lines: Vec<&str> = log.lines().collect();
  let start = lines.len().saturating_sub(count);
  lines.split_off(start)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn elapsed_time_drops_sub_millisecond_noise() {
    assert_eq!(format_elapsed(Duration::from_micros(1_250_400)), "1s 250ms");
    assert_eq!(format_elapsed(Duration::from_micros(300)), "0s");
  }

  #[test]
  fn log_tail_keeps_last_lines() {
    let log = (1..=12).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
    assert_eq!(log_tail(&log, 3), ["10", "11", "12"]);
    assert_eq!(log_tail("only", 3), ["only"]);
  }

  #[test]
  fn status_follows_build_state() {
    let cached = BuildState::Success {
      cached: true,
      forced: false,
      time_elapsed: Duration::ZERO,
    };
    assert_eq!(PackageStatus::from_state(Some(&cached)), PackageStatus::Cached);
    assert_eq!(PackageStatus::from_state(None), PackageStatus::Missing);
    assert_eq!(PackageStatus::Cached.note().as_deref(), Some("(cached)"));
  }
}
