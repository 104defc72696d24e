//! CLI smoke tests for burrow.
//!
//! These tests run every command against small spec graphs in a temporary
//! sandbox with an isolated store prefix.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// A sandbox holding `graph.json`, with its own store prefix.
struct TestEnv {
  temp: TempDir,
}

impl TestEnv {
  fn new(graph: &str) -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("sandbox/greeter")).unwrap();
    std::fs::write(temp.path().join("sandbox/graph.json"), graph).unwrap();
    Self { temp }
  }

  fn graph(&self) -> PathBuf {
    self.temp.path().join("sandbox/graph.json")
  }

  fn prefix(&self) -> PathBuf {
    self.temp.path().join("prefix")
  }

  /// A command for the burrow binary using this environment's store.
  fn burrow(&self, subcommand: &str) -> Command {
    let mut cmd = burrow_cmd();
    cmd.arg(subcommand).arg(self.graph()).arg("--prefix").arg(self.prefix());
    cmd.env_remove("BURROW_IMPORT_PATH");
    cmd
  }
}

fn burrow_cmd() -> Command {
  cargo_bin_cmd!("burrow")
}

/// A root package depending on a tool that installs a script.
const GRAPH: &str = r##"{
  "root": "app-1.0.0-aaaa",
  "specs": {
    "app-1.0.0-aaaa": {
      "name": "app", "version": "1.0.0", "sourcePath": ".", "sourceType": "root",
      "installCommand": ["mkdir -p $cur__share", "greet > $cur__share/greeting"],
      "dependencies": { "greeter": "greeter-0.1.0-bbbb" }
    },
    "greeter-0.1.0-bbbb": {
      "name": "greeter", "version": "0.1.0", "sourcePath": "greeter",
      "installCommand": [
        "mkdir -p #{self.bin}",
        "printf '#!/bin/sh\\necho hello\\n' > #{self.bin}/greet",
        "chmod +x #{self.bin}/greet"
      ],
      "exportedEnv": { "GREETING": { "val": "from #{self.name}", "scope": "global" } }
    }
  }
}"##;

const FAILING_GRAPH: &str = r#"{
  "root": "broken",
  "specs": {
    "broken": {
      "name": "broken", "version": "1", "sourcePath": ".", "sourceType": "root",
      "buildCommand": ["echo about to fail", "exit 4"]
    }
  }
}"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  burrow_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  burrow_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("burrow"));
}

#[test]
fn help_names_default_prefix() {
  burrow_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("$BURROW_PREFIX or ~/.burrow"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "build-env", "plan", "exec", "ls-builds", "export-build"] {
    burrow_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn missing_graph_fails() {
  burrow_cmd()
    .arg("plan")
    .arg("/nonexistent/graph.json")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load spec graph"));
}

// =============================================================================
// Inspection
// =============================================================================

#[test]
fn plan_prints_symbolic_paths() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("%store%/i/greeter-0.1.0-bbbb"))
    .stdout(predicate::str::contains("%localStore%"))
    .stdout(predicate::str::contains(env.prefix().display().to_string()).not());
}

#[test]
fn build_env_renders_exports() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("build-env")
    .assert()
    .success()
    .stdout(predicate::str::contains("# greeter@0.1.0"))
    .stdout(predicate::str::contains("export GREETING=\"from greeter\""))
    .stdout(predicate::str::contains("export cur__name=\"app\""));
}

#[test]
fn build_env_for_named_package_as_json() {
  let env = TestEnv::new(GRAPH);
  let output = env
    .burrow("build-env")
    .arg("--package")
    .arg("greeter")
    .arg("--json")
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let text = json.to_string();
  assert!(text.contains("cur__name"), "{text}");
  assert!(!text.contains("GREETING"), "{text}");
}

#[test]
fn unknown_package_is_an_error() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("build-env")
    .arg("--package")
    .arg("nope")
    .assert()
    .failure()
    .stderr(predicate::str::contains("No package named nope"));
}

#[test]
fn ls_builds_lists_dependencies_first() {
  let env = TestEnv::new(GRAPH);
  let output = env.burrow("ls-builds").arg("--json").output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = json
    .as_array()
    .unwrap()
    .iter()
    .map(|entry| entry["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, ["greeter", "app"]);
  assert_eq!(json[0]["built"], false);
}

// =============================================================================
// Building
// =============================================================================

#[cfg(unix)]
fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap()
}

#[cfg(unix)]
#[test]
fn build_installs_root_and_links_it() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app@1.0.0 is ready"))
    .stdout(predicate::str::contains("Built: 2"));

  let install = env.temp.path().join("sandbox/_burrow/install");
  assert_eq!(read(&install.join("share/greeting")), "hello\n");
}

#[cfg(unix)]
#[test]
fn second_build_reuses_dependency() {
  let env = TestEnv::new(GRAPH);
  env.burrow("build").assert().success();
  env
    .burrow("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("(cached)"))
    .stdout(predicate::str::contains("Built: 1"));

  env
    .burrow("ls-builds")
    .assert()
    .success()
    .stdout(predicate::str::contains("greeter@0.1.0"));
}

#[cfg(unix)]
#[test]
fn only_deps_leaves_root_unbuilt() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("build")
    .arg("--only-deps")
    .assert()
    .success()
    .stdout(predicate::str::contains("greeter@0.1.0"))
    .stdout(predicate::str::contains("Dependencies of app are ready"));
  assert!(!env.temp.path().join("sandbox/_burrow/install").exists());
}

#[cfg(unix)]
#[test]
fn failing_build_exits_nonzero_with_log() {
  let env = TestEnv::new(FAILING_GRAPH);
  env
    .burrow("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("exited with code 4"))
    .stderr(predicate::str::contains("about to fail"));
}

#[cfg(unix)]
#[test]
fn exec_runs_in_build_environment() {
  let env = TestEnv::new(GRAPH);
  env
    .burrow("exec")
    .arg("--")
    .arg("sh")
    .arg("-c")
    .arg("echo $cur__name; greet")
    .assert()
    .success()
    .stdout(predicate::str::contains("app\nhello"));
}

#[cfg(unix)]
#[test]
fn exported_build_is_imported_by_another_store() {
  let env = TestEnv::new(GRAPH);
  let exports = env.temp.path().join("exports");
  env.burrow("build").assert().success();
  env
    .burrow("export-build")
    .arg("--package")
    .arg("greeter")
    .arg("--out")
    .arg(&exports)
    .assert()
    .success()
    .stdout(predicate::str::contains("greeter-0.1.0-bbbb.tar.gz"));

  let other = TempDir::new().unwrap();
  burrow_cmd()
    .arg("build")
    .arg(env.graph())
    .arg("--prefix")
    .arg(other.path())
    .arg("--import-path")
    .arg(&exports)
    .assert()
    .success();

  let imported = env.temp.path().join("sandbox/_burrow/install/share/greeting");
  assert_eq!(read(&imported), "hello\n");
}
