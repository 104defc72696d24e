//! Compiling loaded spec graphs into tasks.

use burrow_lib::config::PathStyle;
use burrow_lib::env::{EnvError, EnvironmentBinding, flatten, render_sh};
use burrow_lib::task::{CompileError, compile, plan_json};
use std::collections::BTreeMap;

use super::common::Sandbox;

const DIAMOND: &str = r##"{
  "root": "app-1.0.0-aaaa",
  "specs": {
    "app-1.0.0-aaaa": {
      "name": "app", "version": "1.0.0", "sourcePath": ".", "sourceType": "root",
      "buildType": "_build",
      "buildCommand": [["dune", "build", "--root", "#{self.root}"]],
      "installCommand": ["dune install --prefix #{self.install}"],
      "dependencies": { "ocamlfind": "ocamlfind-1.9.6-bbbb", "lwt": "lwt-5.7.0-cccc" }
    },
    "ocamlfind-1.9.6-bbbb": {
      "name": "ocamlfind", "version": "1.9.6", "sourcePath": "/src/ocamlfind",
      "exportedEnv": {
        "OCAMLFIND_CONF": { "val": "#{self.lib}/findlib.conf" }
      },
      "dependencies": { "ocaml": "ocaml-4.14.0-dddd" }
    },
    "lwt-5.7.0-cccc": {
      "name": "lwt", "version": "5.7.0", "sourcePath": "/src/lwt",
      "dependencies": { "ocaml": "ocaml-4.14.0-dddd" }
    },
    "ocaml-4.14.0-dddd": {
      "name": "ocaml", "version": "4.14.0", "sourcePath": "/src/ocaml", "buildType": "in-source",
      "exportedEnv": {
        "OCAMLLIB": { "val": "#{self.lib}/ocaml", "scope": "global", "exclusive": true }
      }
    }
  }
}"##;

#[test]
fn diamond_compiles_with_shared_dependency() {
  let sandbox = Sandbox::new();
  let config = sandbox.config();
  let root = compile(&sandbox.load(DIAMOND), &config, &[]).unwrap();

  let via_findlib = &root.dependencies["ocamlfind"].dependencies["ocaml"];
  let via_lwt = &root.dependencies["lwt"].dependencies["ocaml"];
  assert!(std::sync::Arc::ptr_eq(via_findlib, via_lwt));

  let ocaml_install = config.store.path.join("i/ocaml-4.14.0-dddd");
  let env = flatten(&root.env, &BTreeMap::new());
  assert_eq!(env["OCAMLLIB"], format!("{}/lib/ocaml", ocaml_install.display()));
  assert_eq!(env["cur__name"], "app");
  assert_eq!(env["cur__target_dir"], format!("{}/_build", sandbox.path().display()));
  assert!(env["PATH"].contains(&format!("{}/bin", ocaml_install.display())));
}

#[test]
fn local_exports_reach_direct_dependents_only() {
  let sandbox = Sandbox::new();
  let root = compile(&sandbox.load(DIAMOND), &sandbox.config(), &[]).unwrap();

  assert!(root.env.iter().any(|b| b.name == "OCAMLFIND_CONF"));
  let lwt = &root.dependencies["lwt"];
  assert!(!lwt.env.iter().any(|b| b.name == "OCAMLFIND_CONF"));
  assert!(lwt.env.iter().any(|b| b.name == "OCAMLLIB"));
}

#[test]
fn commands_render_against_stage_paths() {
  let sandbox = Sandbox::new();
  let root = compile(&sandbox.load(DIAMOND), &sandbox.config(), &[]).unwrap();

  assert_eq!(
    root.build_command,
    vec![format!("dune build --root {}", sandbox.path().display())]
  );
  assert_eq!(
    root.install_command,
    vec![format!("dune install --prefix {}", root.paths.stage.display())]
  );
}

#[test]
fn extra_env_is_rendered_last_for_root() {
  let sandbox = Sandbox::new();
  let extra = vec![EnvironmentBinding::sandbox("OCAMLRUNPARAM", "b")];
  let root = compile(&sandbox.load(DIAMOND), &sandbox.config(), &extra).unwrap();

  let script = render_sh(&root.env);
  assert!(script.starts_with("# app@1.0.0\n"), "{script}");
  assert!(script.ends_with("# sandbox\nexport OCAMLRUNPARAM=\"b\"\n"), "{script}");
  assert!(!root.dependencies["lwt"].env.iter().any(|b| b.name == "OCAMLRUNPARAM"));
}

#[test]
fn symbolic_plan_hides_machine_paths() {
  let sandbox = Sandbox::new();
  let config = sandbox.config().with_style(PathStyle::Symbolic);
  let root = compile(&sandbox.load(DIAMOND), &config, &[]).unwrap();

  let plan = plan_json(&root);
  assert_eq!(plan["root"], "app-1.0.0-aaaa");
  assert_eq!(plan["tasks"].as_object().unwrap().len(), 4);
  assert_eq!(plan["tasks"]["ocaml-4.14.0-dddd"]["paths"]["install"], "%store%/i/ocaml-4.14.0-dddd");
  assert_eq!(plan["tasks"]["app-1.0.0-aaaa"]["paths"]["source"], "%sandbox%");

  let text = plan.to_string();
  assert!(!text.contains(&sandbox.temp.path().display().to_string()), "{text}");
}

#[test]
fn exclusive_export_conflict_names_both_packages() {
  let graph = r#"{
    "root": "app",
    "specs": {
      "app": { "name": "app", "version": "1", "sourcePath": ".", "sourceType": "root",
               "dependencies": { "a": "a", "b": "b" } },
      "a": { "name": "a", "version": "1", "sourcePath": "/src/a",
             "exportedEnv": { "SHARED": { "val": "from-a", "scope": "global", "exclusive": true } } },
      "b": { "name": "b", "version": "1", "sourcePath": "/src/b",
             "exportedEnv": { "SHARED": { "val": "from-b", "scope": "global" } } }
    }
  }"#;
  let sandbox = Sandbox::new();
  let failure = compile(&sandbox.load(graph), &sandbox.config(), &[]).unwrap_err();

  assert_eq!(failure.errors.len(), 1, "{failure}");
  match &failure.errors[0] {
    CompileError::Env(EnvError::Conflict {
      package,
      name,
      conflicting_package,
      conflicting_path,
      ..
    }) => {
      assert_eq!(name, "SHARED");
      assert_eq!(package, "b");
      assert_eq!(conflicting_package, "a");
      assert_eq!(conflicting_path.to_str(), Some("/src/a"));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn unknown_reference_is_reported_per_package() {
  let graph = r#"{
    "root": "app",
    "specs": {
      "app": { "name": "app", "version": "1", "sourcePath": ".", "sourceType": "root",
               "buildCommand": ["make -C #{missing.lib}"] }
    }
  }"#;
  let sandbox = Sandbox::new();
  let failure = compile(&sandbox.load(graph), &sandbox.config(), &[]).unwrap_err();
  assert!(matches!(
    &failure.errors[..],
    [CompileError::Reference { package, .. }] if package == "app"
  ));
}
