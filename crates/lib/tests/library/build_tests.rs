//! End-to-end builds through the process backend.
#![cfg(unix)]

use std::sync::Arc;

use burrow_lib::build::{BuildError, BuildOptions, CommandBackend, NullReporter, Orchestrator};
use burrow_lib::task::compile;

use super::common::{Sandbox, read};

const GRAPH: &str = r##"{
  "root": "app-1.0.0-aaaa",
  "specs": {
    "app-1.0.0-aaaa": {
      "name": "app", "version": "1.0.0", "sourcePath": ".", "sourceType": "root",
      "buildType": "_build",
      "buildCommand": ["hello > $cur__target_dir/out.txt"],
      "installCommand": [
        "mkdir -p $cur__share",
        "cp _build/out.txt $cur__share/out.txt",
        "echo \"$HELLO_GREETING\" > $cur__share/greeting"
      ],
      "dependencies": { "hello": "hello-1.0.0-bbbb" }
    },
    "hello-1.0.0-bbbb": {
      "name": "hello", "version": "1.0.0", "sourcePath": "vendor/hello", "buildType": "in-source",
      "buildCommand": ["mkdir -p #{self.bin}", "cp hello.sh #{self.bin}/hello", "chmod +x #{self.bin}/hello"],
      "exportedEnv": { "HELLO_GREETING": { "val": "hi from #{self.name}", "scope": "global" } }
    }
  }
}"##;

fn write_sources(sandbox: &Sandbox) {
  sandbox.write_file("vendor/hello/hello.sh", "#!/bin/sh\necho hello\n");
}

fn orchestrator(sandbox: &Sandbox) -> Orchestrator<CommandBackend> {
  let options = BuildOptions {
    parallelism: 2,
    ..BuildOptions::default()
  };
  Orchestrator::new(sandbox.config(), CommandBackend::new(), options, Arc::new(NullReporter))
}

#[tokio::test]
async fn builds_dependency_then_root() {
  let sandbox = Sandbox::new();
  write_sources(&sandbox);
  let root = compile(&sandbox.load(GRAPH), &sandbox.config(), &[]).unwrap();

  let outcome = orchestrator(&sandbox).build(&root).await.unwrap();
  assert!(outcome.is_success(), "{:?}", outcome.failures());
  assert_eq!(outcome.built(), 2);

  let share = root.paths.install.join("share");
  assert_eq!(read(&share.join("out.txt")), "hello\n");
  assert_eq!(read(&share.join("greeting")), "hi from hello\n");

  let link = sandbox.path().join("_burrow/install");
  assert_eq!(std::fs::read_link(link).unwrap(), root.paths.install);
}

#[tokio::test]
async fn second_run_reuses_immutable_dependency() {
  let sandbox = Sandbox::new();
  write_sources(&sandbox);
  let root = compile(&sandbox.load(GRAPH), &sandbox.config(), &[]).unwrap();

  assert!(orchestrator(&sandbox).build(&root).await.unwrap().is_success());
  let outcome = orchestrator(&sandbox).build(&root).await.unwrap();

  assert!(outcome.states["hello-1.0.0-bbbb"].is_cached());
  assert!(!outcome.root_state().unwrap().is_cached());
  assert_eq!(outcome.built(), 1);
}

#[tokio::test]
async fn failing_dependency_reports_its_log() {
  let sandbox = Sandbox::new();
  sandbox.write_file("vendor/hello/README", "");
  let root = compile(&sandbox.load(GRAPH), &sandbox.config(), &[]).unwrap();

  let outcome = orchestrator(&sandbox).build(&root).await.unwrap();
  assert!(!outcome.is_success());

  let failures = outcome.failures();
  assert_eq!(failures.len(), 1);
  match failures[0].as_ref() {
    BuildError::Command { id, log_path, .. } => {
      assert_eq!(id, "hello-1.0.0-bbbb");
      assert!(read(log_path).contains("hello.sh"));
    }
    other => panic!("unexpected failure: {other}"),
  }
  assert!(!root.paths.install.exists());
}
