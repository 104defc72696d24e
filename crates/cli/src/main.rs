mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{
  BuildArgs, GlobalOpts, cmd_build, cmd_build_env, cmd_exec, cmd_export_build, cmd_ls_builds, cmd_plan,
};

/// burrow - build orchestrator for native package graphs
#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Prefix of the global store (default: $BURROW_PREFIX or ~/.burrow)
  #[arg(long, global = true, value_name = "DIR")]
  prefix: Option<PathBuf>,

  /// Sandbox directory (default: the directory holding the spec graph)
  #[arg(long, global = true, value_name = "DIR")]
  sandbox: Option<PathBuf>,

  /// Directory to import prebuilt artifacts from; may be repeated
  #[arg(long = "import-path", global = true, value_name = "DIR")]
  import_paths: Vec<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a spec graph
  Build(BuildArgs),

  /// Print the build environment of a package
  BuildEnv {
    /// Path to the spec graph
    graph: PathBuf,

    /// Package to print the environment of (default: the root package)
    #[arg(short, long)]
    package: Option<String>,

    /// Print as JSON instead of shell statements
    #[arg(long)]
    json: bool,
  },

  /// Print the compiled task graph as JSON
  Plan {
    /// Path to the spec graph
    graph: PathBuf,
  },

  /// Run a command in the root package's build environment
  Exec {
    /// Path to the spec graph
    graph: PathBuf,

    /// Command to run
    #[arg(last = true, required = true)]
    command: Vec<String>,
  },

  /// List the packages of a spec graph and whether they are built
  LsBuilds {
    /// Path to the spec graph
    graph: PathBuf,

    /// Print as JSON
    #[arg(long)]
    json: bool,
  },

  /// Pack a built package so another store can import it
  ExportBuild {
    /// Path to the spec graph
    graph: PathBuf,

    /// Directory to write the archive to
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,

    /// Package to export (default: the root package)
    #[arg(short, long)]
    package: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let opts = GlobalOpts {
    prefix: cli.prefix,
    sandbox: cli.sandbox,
    import_paths: cli.import_paths,
  };

  match cli.command {
    Commands::Build(args) => cmd_build(args, &opts),
    Commands::BuildEnv { graph, package, json } => cmd_build_env(&graph, package.as_deref(), json, &opts),
    Commands::Plan { graph } => cmd_plan(&graph, &opts),
    Commands::Exec { graph, command } => cmd_exec(&graph, &command, &opts),
    Commands::LsBuilds { graph, json } => cmd_ls_builds(&graph, json, &opts),
    Commands::ExportBuild { graph, out, package } => cmd_export_build(&graph, package.as_deref(), &out, &opts),
  }
}
