//! Compiling a spec graph into a task graph.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use super::scope::{Scope, ScopeEvaluator};
use super::{BuildTask, TaskPaths};
use crate::config::Config;
use crate::env::{EnvBuilder, EnvError, EnvironmentBinding};
use crate::expr::{ExprError, render};
use crate::graph::{DepMap, topological_fold};
use crate::spec::{BuildSpec, CommandSpec, ExportScope};

const DYNAMIC_LIBRARY_PATH: &str = "CAML_LD_LIBRARY_PATH";

/// A problem found while compiling one package.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
  #[error("{package}: syntax error in {context}: {source}")]
  Syntax {
    package: String,
    context: String,
    #[source]
    source: ExprError,
  },

  #[error("{package}: cannot evaluate {context}: {source}")]
  Reference {
    package: String,
    context: String,
    #[source]
    source: ExprError,
  },

  #[error(transparent)]
  Env(#[from] EnvError),
}

impl CompileError {
  fn expression(package: &str, context: String, source: ExprError) -> Self {
    let package = package.to_string();
    if source.is_syntax() {
      CompileError::Syntax {
        package,
        context,
        source,
      }
    } else {
      CompileError::Reference {
        package,
        context,
        source,
      }
    }
  }
}

/// Every problem found while compiling a task graph.
#[derive(Debug, Clone, Error)]
#[error("failed to compile build tasks:{}", format_errors(.errors))]
pub struct CompileFailure {
  pub errors: Vec<CompileError>,
}

fn format_errors(errors: &[CompileError]) -> String {
  errors.iter().map(|e| format!("\n  {e}")).collect()
}

/// Per-package compilation result carried through the fold.
#[derive(Debug, Clone)]
struct Compiled {
  task: Arc<BuildTask>,
  local_exports: Arc<Vec<EnvironmentBinding>>,
  global_exports: Arc<Vec<EnvironmentBinding>>,
}

/// Errors keyed by package id, so a package reached along several paths
/// reports its problems once.
type Failed = Arc<BTreeMap<String, Vec<CompileError>>>;

type Folded = Result<Compiled, Failed>;

/// Compiles spec graphs into task graphs, reusing packages already compiled
/// by earlier calls.
pub struct TaskCompiler<'a> {
  config: &'a Config,
  cache: HashMap<String, Compiled>,
}

impl<'a> TaskCompiler<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self {
      config,
      cache: HashMap::new(),
    }
  }

  /// Compile the graph under `root`.
  ///
  /// `extra_env` is appended to the root task's environment only, after
  /// everything its dependencies contribute.
  ///
  /// # Errors
  ///
  /// Returns every expression and environment error found in the graph.
  #[instrument(skip_all, fields(root = %root.id))]
  pub fn compile(
    &mut self,
    root: &Arc<BuildSpec>,
    extra_env: &[EnvironmentBinding],
  ) -> Result<Arc<BuildTask>, CompileFailure> {
    let config = self.config;
    let cache = &mut self.cache;

    let folded = topological_fold(root, |direct: &DepMap<Folded>, all: &DepMap<Folded>, spec: &Arc<BuildSpec>| {
      let is_root = spec.id == root.id;
      let cacheable = !is_root || extra_env.is_empty();
      if cacheable && let Some(cached) = cache.get(&spec.id) {
        return Ok(cached.clone());
      }
      let extra: &[EnvironmentBinding] = if is_root { extra_env } else { &[] };
      let result = compile_node(config, direct, all, spec, extra);
      if cacheable && let Ok(compiled) = &result {
        cache.insert(spec.id.clone(), compiled.clone());
      }
      result
    });

    match folded {
      Ok(compiled) => {
        debug!(env = compiled.task.env.len(), "compiled task graph");
        Ok(compiled.task)
      }
      Err(failed) => Err(CompileFailure {
        errors: failed.values().flatten().cloned().collect(),
      }),
    }
  }
}

/// Compile the graph under `root` with a fresh [`TaskCompiler`].
///
/// # Errors
///
/// See [`TaskCompiler::compile`].
pub fn compile(
  root: &Arc<BuildSpec>,
  config: &Config,
  extra_env: &[EnvironmentBinding],
) -> Result<Arc<BuildTask>, CompileFailure> {
  TaskCompiler::new(config).compile(root, extra_env)
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

fn task_paths(config: &Config, spec: &BuildSpec) -> TaskPaths {
  TaskPaths {
    source: config.source_path(spec),
    root: config.root_path(spec),
    build: config.build_path(spec),
    stage: config.stage_path(spec),
    install: config.install_path(spec),
    log: config.log_path(spec),
  }
}

/// Scope describing a package as seen by expressions, with install-relative
/// attributes rooted at `install`.
fn package_record(config: &Config, spec: &BuildSpec, install: &Path) -> Scope {
  let mut record = Scope::new();
  record.insert_value("name", spec.name.as_str());
  record.insert_value("version", spec.version.as_str());
  record.insert_value("depends", spec.dependency_names());
  record.insert_value("root", path_str(&config.root_path(spec)));
  record.insert_value("original_root", path_str(&config.source_path(spec)));
  record.insert_value("target_dir", path_str(&config.build_path(spec)));
  record.insert_value("install", path_str(install));
  for dir in ["bin", "sbin", "lib", "man", "doc", "stublibs", "toplevel", "share", "etc"] {
    record.insert_value(dir, path_str(&install.join(dir)));
  }
  record
}

fn collect_failures(all: &DepMap<Folded>) -> BTreeMap<String, Vec<CompileError>> {
  let mut failed = BTreeMap::new();
  for result in all.values() {
    if let Err(errors) = result {
      for (id, errs) in errors.iter() {
        failed.entry(id.clone()).or_insert_with(|| errs.clone());
      }
    }
  }
  failed
}

fn compile_node(
  config: &Config,
  direct: &DepMap<Folded>,
  all: &DepMap<Folded>,
  spec: &Arc<BuildSpec>,
  extra_env: &[EnvironmentBinding],
) -> Folded {
  let failed = collect_failures(all);
  if !failed.is_empty() {
    return Err(Arc::new(failed));
  }
  let direct: Vec<&Compiled> = direct.values().filter_map(|r| r.as_ref().ok()).collect();
  let all: Vec<&Compiled> = all.values().filter_map(|r| r.as_ref().ok()).collect();

  let platform = config.platform;
  let paths = task_paths(config, spec);
  let mut errors: Vec<CompileError> = Vec::new();

  // Commands see `self` installing into the stage directory; exports describe
  // the final installation.
  let mut command_scope = Scope::new();
  let mut export_scope = Scope::new();
  for scope in [&mut command_scope, &mut export_scope] {
    scope.insert_value("os", platform.os.as_str());
    scope.insert_value("arch", platform.arch.as_str());
  }
  for dep in &direct {
    let dep_spec = &dep.task.spec;
    let record = package_record(config, dep_spec, &config.install_path(dep_spec));
    command_scope.insert_scope(&dep_spec.name, record.clone());
    export_scope.insert_scope(&dep_spec.name, record);
  }
  let staged = package_record(config, spec, &paths.stage);
  let installed = package_record(config, spec, &paths.install);
  command_scope.insert_scope(&spec.name, staged.clone());
  command_scope.insert_scope("self", staged);
  export_scope.insert_scope(&spec.name, installed.clone());
  export_scope.insert_scope("self", installed);

  let (local_exports, global_exports) = evaluate_exports(spec, &export_scope, config, &mut errors);

  let mut env = EnvBuilder::new();
  env.extend(synthesized_env(config, spec, &paths, &all));
  env.extend(built_in_env(spec, &paths));
  for dep in &direct {
    env.extend(dep.local_exports.iter().cloned());
  }
  for dep in &all {
    env.extend(dep.global_exports.iter().cloned());
  }
  env.extend(extra_env.iter().cloned());
  let env = match env.finish() {
    Ok(env) => env,
    Err(conflicts) => {
      errors.extend(conflicts.into_iter().map(CompileError::from));
      Vec::new()
    }
  };

  let evaluator = ScopeEvaluator {
    scope: &command_scope,
    platform,
  };
  let build_command = render_commands(spec, "build command", &spec.build_command, &evaluator, &mut errors);
  let install_command = render_commands(spec, "install command", &spec.install_command, &evaluator, &mut errors);

  if !errors.is_empty() {
    return Err(Arc::new(BTreeMap::from([(spec.id.clone(), errors)])));
  }

  let dependencies = spec
    .dependencies
    .iter()
    .filter_map(|(name, dep_spec)| {
      direct
        .iter()
        .find(|dep| dep.task.id == dep_spec.id)
        .map(|dep| (name.clone(), Arc::clone(&dep.task)))
    })
    .collect();

  let task = BuildTask {
    id: spec.id.clone(),
    spec: Arc::clone(spec),
    env,
    scope: command_scope,
    build_command,
    install_command,
    dependencies,
    paths,
    errors: spec.errors.clone(),
  };

  Ok(Compiled {
    task: Arc::new(task),
    local_exports: Arc::new(local_exports),
    global_exports: Arc::new(global_exports),
  })
}

fn evaluate_exports(
  spec: &Arc<BuildSpec>,
  scope: &Scope,
  config: &Config,
  errors: &mut Vec<CompileError>,
) -> (Vec<EnvironmentBinding>, Vec<EnvironmentBinding>) {
  let evaluator = ScopeEvaluator {
    scope,
    platform: config.platform,
  };
  let mut local = Vec::new();
  let mut global = Vec::new();

  for (name, var) in &spec.exported_env {
    match render(&var.value, &evaluator) {
      Ok(value) => {
        let mut binding = EnvironmentBinding::from_package(name, &value, spec);
        binding.exclusive = var.exclusive;
        match var.scope {
          ExportScope::Local => local.push(binding),
          ExportScope::Global => global.push(binding),
        }
      }
      Err(source) => errors.push(CompileError::expression(
        &spec.name,
        format!("exported variable {name}"),
        source,
      )),
    }
  }

  if !global.iter().any(|b| b.name == DYNAMIC_LIBRARY_PATH) {
    let expr = format!("#{{self.stublibs : ${DYNAMIC_LIBRARY_PATH}}}");
    match render(&expr, &evaluator) {
      Ok(value) => global.push(EnvironmentBinding::from_package(DYNAMIC_LIBRARY_PATH, &value, spec)),
      Err(source) => errors.push(CompileError::expression(
        &spec.name,
        DYNAMIC_LIBRARY_PATH.to_string(),
        source,
      )),
    }
  }

  (local, global)
}

/// Variables derived from the whole dependency closure. Nearest dependencies
/// come first in search paths.
fn synthesized_env(
  config: &Config,
  spec: &Arc<BuildSpec>,
  paths: &TaskPaths,
  all: &[&Compiled],
) -> Vec<EnvironmentBinding> {
  let delimiter = config.platform.path_delimiter();
  let dirs = |sub: &str| -> Vec<String> {
    all
      .iter()
      .rev()
      .map(|dep| path_str(&config.install_path(&dep.task.spec).join(sub)))
      .collect()
  };
  let search_path = |sub: &str, var: &str| {
    let mut entries = dirs(sub);
    entries.push(format!("${var}"));
    entries.join(delimiter)
  };

  vec![
    EnvironmentBinding::from_package("OCAMLPATH", &dirs("lib").join(delimiter), spec).exclusive(),
    EnvironmentBinding::from_package("OCAMLFIND_DESTDIR", &path_str(&paths.stage.join("lib")), spec).exclusive(),
    EnvironmentBinding::from_package("OCAMLFIND_LDCONF", "ignore", spec).exclusive(),
    EnvironmentBinding::from_package("PATH", &search_path("bin", "PATH"), spec),
    EnvironmentBinding::from_package("MAN_PATH", &search_path("man", "MAN_PATH"), spec),
  ]
}

/// `cur__*` variables describing the package being built.
fn built_in_env(spec: &Arc<BuildSpec>, paths: &TaskPaths) -> Vec<EnvironmentBinding> {
  let stage = &paths.stage;
  let mut vars = vec![
    ("cur__name", spec.name.clone()),
    ("cur__version", spec.version.clone()),
    ("cur__root", path_str(&paths.root)),
    ("cur__original_root", path_str(&paths.source)),
    ("cur__depends", spec.dependency_names()),
    ("cur__target_dir", path_str(&paths.build)),
    ("cur__install", path_str(stage)),
  ];
  for (name, dir) in [
    ("cur__bin", "bin"),
    ("cur__sbin", "sbin"),
    ("cur__lib", "lib"),
    ("cur__man", "man"),
    ("cur__doc", "doc"),
    ("cur__stublibs", "stublibs"),
    ("cur__toplevel", "toplevel"),
    ("cur__share", "share"),
    ("cur__etc", "etc"),
  ] {
    vars.push((name, path_str(&stage.join(dir))));
  }

  vars
    .into_iter()
    .map(|(name, value)| EnvironmentBinding::from_package(name, &value, spec).built_in())
    .collect()
}

fn render_commands(
  spec: &BuildSpec,
  what: &str,
  commands: &[CommandSpec],
  evaluator: &ScopeEvaluator<'_>,
  errors: &mut Vec<CompileError>,
) -> Vec<String> {
  let mut rendered = Vec::with_capacity(commands.len());
  for (idx, command) in commands.iter().enumerate() {
    let context = format!("{what} #{}", idx + 1);
    let result = match command {
      CommandSpec::Shell(line) => render(line, evaluator),
      CommandSpec::Args(args) => args
        .iter()
        .map(|arg| render(arg, evaluator).map(|value| quote_arg(&value)))
        .collect::<Result<Vec<_>, _>>()
        .map(|args| args.join(" ")),
    };
    match result {
      Ok(line) => rendered.push(line),
      Err(source) => errors.push(CompileError::expression(&spec.name, context, source)),
    }
  }
  rendered
}

/// Quote an argument for a shell command line when it needs it.
pub fn quote_arg(arg: &str) -> String {
  if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
    return arg.to_string();
  }
  format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PathStyle;
  use crate::env::{ConflictReason, flatten};
  use crate::platform::{Arch, Os, Platform};
  use crate::spec::ExportedVar;
  use crate::store::Store;
  use crate::util::testutil::{spec, with_build, with_deps, with_export};
  use std::path::PathBuf;

  fn config() -> Config {
    Config {
      store: Store::new("/store", "%store%"),
      local_store: Store::new("/work/app/_burrow/store", "%localStore%"),
      sandbox_path: PathBuf::from("/work/app"),
      platform: Platform::default(),
      import_paths: Vec::new(),
      style: PathStyle::Concrete,
    }
  }

  fn sep() -> &'static str {
    Platform::default().path_delimiter()
  }

  fn value<'a>(task: &'a BuildTask, name: &str) -> Vec<&'a str> {
    task
      .env
      .iter()
      .filter(|b| b.name == name)
      .map(|b| b.value.as_str())
      .collect()
  }

  /// A -> B -> C, C exports one local and one global variable.
  fn chain() -> Arc<BuildSpec> {
    let c = spec("c");
    let c = with_export(c, "C_LOCAL", ExportedVar::local("#{self.lib}"));
    let c = Arc::new(with_export(c, "C_GLOBAL", ExportedVar::global("#{self.bin}")));
    let b = Arc::new(with_deps(spec("b"), &[&c]));
    Arc::new(with_deps(spec("a"), &[&b]))
  }

  #[test]
  fn local_exports_reach_direct_dependents_only() {
    let a = compile(&chain(), &config(), &[]).unwrap();
    let b = &a.dependencies["b"];
    assert_eq!(value(b, "C_LOCAL"), vec!["/store/i/c-1.0.0-0000/lib"]);
    assert!(value(&a, "C_LOCAL").is_empty());
  }

  #[test]
  fn global_exports_reach_transitive_dependents() {
    let a = compile(&chain(), &config(), &[]).unwrap();
    assert_eq!(value(&a, "C_GLOBAL"), vec!["/store/i/c-1.0.0-0000/bin"]);
    assert_eq!(value(&a.dependencies["b"], "C_GLOBAL"), vec!["/store/i/c-1.0.0-0000/bin"]);
  }

  #[test]
  fn built_ins_describe_the_stage_directory() {
    let a = compile(&chain(), &config(), &[]).unwrap();
    assert_eq!(value(&a, "cur__name"), vec!["a"]);
    assert_eq!(value(&a, "cur__install"), vec!["/store/s/a-1.0.0-0000"]);
    assert_eq!(value(&a, "cur__lib"), vec!["/store/s/a-1.0.0-0000/lib"]);
    assert_eq!(value(&a, "cur__depends"), vec!["b"]);
    assert!(a.env.iter().filter(|b| b.name.starts_with("cur__")).all(|b| b.built_in));
  }

  #[test]
  fn caml_ld_library_path_accumulates_across_diamond() {
    let ocaml = Arc::new(spec("ocaml"));
    let ocamlfind = Arc::new(with_deps(spec("ocamlfind"), &[&ocaml]));
    let lwt = Arc::new(with_deps(spec("lwt"), &[&ocaml]));
    let app = Arc::new(with_deps(spec("app"), &[&ocamlfind, &lwt]));

    let task = compile(&app, &config(), &[]).unwrap();
    assert_eq!(value(&task, "CAML_LD_LIBRARY_PATH").len(), 3);

    let ambient = BTreeMap::from([("CAML_LD_LIBRARY_PATH".to_string(), "/usr/lib".to_string())]);
    let flat = flatten(&task.env, &ambient);
    let d = sep();
    assert_eq!(
      flat["CAML_LD_LIBRARY_PATH"],
      format!(
        "/store/i/ocamlfind-1.0.0-0000/stublibs{d}/store/i/lwt-1.0.0-0000/stublibs{d}/store/i/ocaml-1.0.0-0000/stublibs{d}/usr/lib"
      )
    );
  }

  #[test]
  fn search_paths_put_nearest_dependency_first() {
    let ocaml = Arc::new(spec("ocaml"));
    let lwt = Arc::new(with_deps(spec("lwt"), &[&ocaml]));
    let app = Arc::new(with_deps(spec("app"), &[&lwt]));

    let task = compile(&app, &config(), &[]).unwrap();
    let d = sep();
    assert_eq!(
      value(&task, "PATH"),
      vec![format!("/store/i/lwt-1.0.0-0000/bin{d}/store/i/ocaml-1.0.0-0000/bin{d}$PATH")]
    );
    assert_eq!(
      value(&task, "OCAMLPATH"),
      vec![format!("/store/i/lwt-1.0.0-0000/lib{d}/store/i/ocaml-1.0.0-0000/lib")]
    );
    assert_eq!(value(&task, "OCAMLFIND_DESTDIR"), vec!["/store/s/app-1.0.0-0000/lib"]);
  }

  #[test]
  fn commands_see_stage_and_dependency_paths() {
    let ocaml = Arc::new(spec("ocaml"));
    let app = with_deps(spec("app"), &[&ocaml]);
    let mut app = with_build(app, &["make PREFIX=#{self.install} OCAML=#{ocaml.bin / 'ocaml'}"]);
    app.install_command = vec![CommandSpec::Args(vec![
      "cp".to_string(),
      "my file".to_string(),
      "#{self.bin}".to_string(),
    ])];

    let task = compile(&Arc::new(app), &config(), &[]).unwrap();
    assert_eq!(
      task.build_command,
      vec!["make PREFIX=/store/s/app-1.0.0-0000 OCAML=/store/i/ocaml-1.0.0-0000/bin/ocaml"]
    );
    assert_eq!(task.install_command, vec!["cp \"my file\" /store/s/app-1.0.0-0000/bin"]);
  }

  #[test]
  fn exports_use_final_install_path() {
    let c = Arc::new(with_export(spec("c"), "C_HOME", ExportedVar::local("#{self.install}")));
    let b = Arc::new(with_deps(spec("b"), &[&c]));
    let task = compile(&b, &config(), &[]).unwrap();
    assert_eq!(value(&task, "C_HOME"), vec!["/store/i/c-1.0.0-0000"]);
  }

  #[test]
  fn extra_env_applies_to_root_only() {
    let extra = [EnvironmentBinding::sandbox("DEBUG", "1")];
    let a = compile(&chain(), &config(), &extra).unwrap();
    assert_eq!(value(&a, "DEBUG"), vec!["1"]);
    assert!(value(&a.dependencies["b"], "DEBUG").is_empty());
  }

  #[test]
  fn exclusive_export_conflicts_are_reported() {
    let x = Arc::new(with_export(spec("x"), "SHARED", ExportedVar::global("x").exclusive()));
    let y = Arc::new(with_export(spec("y"), "SHARED", ExportedVar::global("y")));
    let app = Arc::new(with_deps(spec("app"), &[&x, &y]));

    let failure = compile(&app, &config(), &[]).unwrap_err();
    assert_eq!(failure.errors.len(), 1);
    assert!(matches!(
      &failure.errors[0],
      CompileError::Env(EnvError::Conflict {
        package,
        conflicting_package,
        reason: ConflictReason::Exclusive,
        ..
      }) if package == "y" && conflicting_package == "x"
    ));
  }

  #[test]
  fn overriding_built_in_is_reported() {
    let evil = Arc::new(with_export(spec("evil"), "cur__name", ExportedVar::local("nope")));
    let app = Arc::new(with_deps(spec("app"), &[&evil]));
    let failure = compile(&app, &config(), &[]).unwrap_err();
    assert!(matches!(
      &failure.errors[0],
      CompileError::Env(EnvError::Conflict { reason: ConflictReason::BuiltIn, .. })
    ));
  }

  #[test]
  fn expression_errors_are_collected_once_per_package() {
    let broken = with_build(spec("broken"), &["echo #{nothing.here}", "echo #{self.}"]);
    let broken = Arc::new(broken);
    let left = Arc::new(with_deps(spec("left"), &[&broken]));
    let right = Arc::new(with_deps(spec("right"), &[&broken]));
    let app = Arc::new(with_deps(spec("app"), &[&left, &right]));

    let failure = compile(&app, &config(), &[]).unwrap_err();
    assert_eq!(failure.errors.len(), 2);
    assert!(matches!(failure.errors[0], CompileError::Reference { .. }));
    assert!(matches!(failure.errors[1], CompileError::Syntax { .. }));
  }

  #[test]
  fn expressions_see_the_target_platform() {
    let mut cfg = config();
    cfg.platform = Platform::new(Os::Windows, Arch::X86_64);
    let a = Arc::new(with_export(spec("a"), "A_PATH", ExportedVar::global("#{self.bin : $A_PATH}")));
    let b = with_build(with_deps(spec("b"), &[&a]), &["make OS=#{os} ARCH=#{arch}"]);
    let task = compile(&Arc::new(b), &cfg, &[]).unwrap();

    assert_eq!(task.build_command, vec!["make OS=windows ARCH=x86_64"]);
    assert_eq!(value(&task, "A_PATH"), vec!["/store/i/a-1.0.0-0000/bin;$A_PATH"]);
  }

  #[test]
  fn symbolic_style_compiles_portable_paths() {
    let cfg = config().with_style(PathStyle::Symbolic);
    let a = compile(&chain(), &cfg, &[]).unwrap();
    assert_eq!(value(&a, "C_GLOBAL"), vec!["%store%/i/c-1.0.0-0000/bin"]);
  }

  #[test]
  fn compiler_cache_is_shared_between_roots() {
    let cfg = config();
    let mut compiler = TaskCompiler::new(&cfg);
    let root = chain();
    let a = compiler.compile(&root, &[]).unwrap();
    let b = compiler.compile(&root.dependencies["b"], &[]).unwrap();
    assert!(Arc::ptr_eq(&a.dependencies["b"], &b));
  }

  #[test]
  fn quote_arg_wraps_only_when_needed() {
    assert_eq!(quote_arg("plain"), "plain");
    assert_eq!(quote_arg("two words"), "\"two words\"");
    assert_eq!(quote_arg(""), "\"\"");
    assert_eq!(quote_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
  }
}
