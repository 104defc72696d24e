//! Running a task's commands.

use std::collections::BTreeMap;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::report::{BuildEvent, Reporter};
use super::types::BuildError;
use crate::consts::SANDBOX_DIR;
use crate::env::flatten;
use crate::spec::{BuildType, SourceType};
use crate::task::BuildTask;
use crate::util::fs::{copy_dir, remove_dir_if_exists, replace_dir};

/// Executes the commands of one task.
///
/// On success the task's installation must be present at its install path.
pub trait BuildBackend: Send + Sync + 'static {
  fn build(
    &self,
    task: Arc<BuildTask>,
    reporter: Arc<dyn Reporter>,
  ) -> impl Future<Output = Result<(), BuildError>> + Send;
}

/// Default search path for commands, expanded where bindings reference
/// `$PATH` without any dependency providing it.
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Runs commands with a shell in an environment made only of the task's
/// bindings, writing their output to the task's log file.
#[derive(Debug, Clone)]
pub struct CommandBackend {
  shell: String,
  shell_flag: String,
  ambient: BTreeMap<String, String>,
}

#[cfg(not(windows))]
const DEFAULT_SHELL: (&str, &str) = ("/bin/sh", "-c");

#[cfg(windows)]
const DEFAULT_SHELL: (&str, &str) = ("cmd.exe", "/C");

impl Default for CommandBackend {
  fn default() -> Self {
    Self {
      shell: DEFAULT_SHELL.0.to_string(),
      shell_flag: DEFAULT_SHELL.1.to_string(),
      ambient: BTreeMap::from([("PATH".to_string(), DEFAULT_PATH.to_string())]),
    }
  }
}

impl CommandBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run commands as `<shell> <flag> <command>`, e.g. `bash -c` or
  /// `pwsh -Command`.
  pub fn with_shell(mut self, shell: &str, flag: &str) -> Self {
    self.shell = shell.to_string();
    self.shell_flag = flag.to_string();
    self
  }

  /// Values `$NAME` references fall back to when no binding provides them.
  pub fn with_ambient(mut self, ambient: BTreeMap<String, String>) -> Self {
    self.ambient = ambient;
    self
  }

  /// The process environment of `task`: its bindings resolved against the
  /// ambient values, plus a private temporary directory.
  pub fn environment(&self, task: &BuildTask) -> BTreeMap<String, String> {
    let mut env = flatten(&task.env, &self.ambient);
    let tmp = task.paths.build.join("tmp").to_string_lossy().into_owned();
    for name in ["TMPDIR", "TMP", "TEMP"] {
      env.entry(name.to_string()).or_insert_with(|| tmp.clone());
    }
    env
  }

  /// Run `argv` in the environment of `task`, attached to the terminal.
  ///
  /// # Errors
  ///
  /// Returns an error if the command cannot be started.
  pub async fn run_interactive(&self, task: &BuildTask, argv: &[String]) -> Result<ExitStatus, BuildError> {
    let (program, args) = argv.split_first().ok_or_else(|| BuildError::Interactive {
      message: "no command given".to_string(),
    })?;

    let env = self.environment(task);
    fs::create_dir_all(task.paths.build.join("tmp"))
      .await
      .map_err(|e| BuildError::Interactive { message: e.to_string() })?;

    info!(cmd = %argv.join(" "), id = %task.id, "running command in build environment");
    Command::new(program)
      .args(args)
      .current_dir(&task.paths.root)
      .env_clear()
      .envs(&env)
      .status()
      .await
      .map_err(|e| BuildError::Interactive {
        message: format!("{program}: {e}"),
      })
  }

  async fn prepare(&self, task: &BuildTask) -> std::io::Result<()> {
    let paths = &task.paths;
    let shared_build_dir = !matches!(
      (task.spec.source_type, task.spec.build_type),
      (SourceType::Root, BuildType::UnderscoreBuild)
    );
    if shared_build_dir {
      let build = paths.build.clone();
      blocking(move || remove_dir_if_exists(&build)).await?;
    }
    fs::create_dir_all(&paths.build).await?;
    fs::create_dir_all(paths.build.join("tmp")).await?;
    fs::create_dir_all(&paths.root).await?;

    if task.spec.build_type == BuildType::InSource {
      let (source, build) = (paths.source.clone(), paths.build.clone());
      let copied = blocking(move || copy_dir(&source, &build, &[SANDBOX_DIR])).await?;
      debug!(id = %task.id, files = copied, "copied sources into build directory");
    }

    let stage = paths.stage.clone();
    blocking(move || remove_dir_if_exists(&stage)).await?;
    fs::create_dir_all(&paths.stage).await?;
    if let Some(parent) = paths.log.parent() {
      fs::create_dir_all(parent).await?;
    }
    Ok(())
  }

  async fn run_command(
    &self,
    task: &Arc<BuildTask>,
    command: &str,
    env: &BTreeMap<String, String>,
    log: &mut fs::File,
    reporter: &Arc<dyn Reporter>,
  ) -> Result<(), BuildError> {
    let internal = |e: std::io::Error| BuildError::internal(&task.id, e);
    log.write_all(format!("# {command}\n").as_bytes()).await.map_err(internal)?;

    debug!(shell = %self.shell, cwd = ?task.paths.root, "spawning process");
    let mut child = Command::new(&self.shell)
      .arg(&self.shell_flag)
      .arg(command)
      .current_dir(&task.paths.root)
      .env_clear()
      .envs(env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(internal)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
      tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
      tokio::spawn(forward_lines(stderr, tx));
    } else {
      drop(tx);
    }

    while let Some(line) = rx.recv().await {
      log.write_all(line.as_bytes()).await.map_err(internal)?;
      log.write_all(b"\n").await.map_err(internal)?;
      reporter.report(&BuildEvent::Output {
        task: Arc::clone(task),
        line,
      });
    }

    let status = child.wait().await.map_err(internal)?;
    if status.success() {
      return Ok(());
    }
    Err(BuildError::Command {
      id: task.id.clone(),
      log_path: task.paths.log.clone(),
      message: match status.code() {
        Some(code) => format!("`{command}` exited with code {code}"),
        None => format!("`{command}` was terminated by a signal"),
      },
    })
  }
}

impl BuildBackend for CommandBackend {
  async fn build(&self, task: Arc<BuildTask>, reporter: Arc<dyn Reporter>) -> Result<(), BuildError> {
    self
      .prepare(&task)
      .await
      .map_err(|e| BuildError::internal(&task.id, format!("preparing build directories: {e}")))?;

    let env = self.environment(&task);
    let mut log = fs::File::create(&task.paths.log)
      .await
      .map_err(|e| BuildError::internal(&task.id, e))?;

    for command in task.build_command.iter().chain(&task.install_command) {
      self.run_command(&task, command, &env, &mut log, &reporter).await?;
    }
    log.flush().await.map_err(|e| BuildError::internal(&task.id, e))?;

    let (stage, install) = (task.paths.stage.clone(), task.paths.install.clone());
    blocking(move || replace_dir(&stage, &install))
      .await
      .map_err(|e| BuildError::internal(&task.id, format!("installing: {e}")))?;
    Ok(())
  }
}

async fn blocking<T, F>(work: F) -> std::io::Result<T>
where
  F: FnOnce() -> std::io::Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(work).await.map_err(std::io::Error::other)?
}

async fn forward_lines(stream: impl AsyncRead + Unpin, tx: mpsc::UnboundedSender<String>) {
  let mut lines = BufReader::new(stream).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    if tx.send(line).is_err() {
      break;
    }
  }
}
