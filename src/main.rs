use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error};

use caserun::config::{self, Overrides, RunConfig};
use caserun::pipeline::{Pipeline, Stage, StageFailure};
use caserun::subprocess::SubprocessManager;
use caserun::toolchain::SOLVER_ROOT_VAR;
use caserun::Error;

/// Orchestrate a parallel numerical-simulation case run: write the mesh
/// and session descriptors, resolve the solver toolchain environment,
/// build the case's solver binary, and launch it under the parallel
/// runtime.
#[derive(Parser)]
#[command(name = "caserun", version)]
struct Cli {
    /// Number of parallel worker processes for the solver job.
    worker_count: Option<String>,

    /// Simulation case name (descriptor identity and build target).
    #[arg(long)]
    case: Option<String>,

    /// Mesh refinement tolerance (> 0).
    #[arg(long)]
    tolerance: Option<f64>,

    /// Solver toolchain root (default: $SOLVER_ROOT, else ./solver).
    #[arg(long)]
    toolchain_root: Option<PathBuf>,

    /// Path to a TOML config file (default: ./caserun.toml when present).
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Deadline for the build stage, e.g. "10m".
    #[arg(long)]
    build_timeout: Option<String>,

    /// Deadline for the launch stage, e.g. "12h".
    #[arg(long)]
    launch_timeout: Option<String>,

    /// Run the mesh generator on the freshly written descriptor before
    /// building.
    #[arg(long)]
    generate_mesh: bool,

    /// Print the run plan without writing files or spawning tools.
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("caserun started with verbosity level {}", cli.verbose);

    if let Err(err) = run(cli).await {
        error!("fatal: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workdir = std::env::current_dir().map_err(|err| {
        StageFailure::new(
            Stage::ResolveConfig,
            Error::Config(format!("cannot determine working directory: {err}")),
        )
    })?;

    let overrides = Overrides {
        case: cli.case,
        tolerance: cli.tolerance,
        toolchain_root: cli
            .toolchain_root
            .or_else(|| std::env::var_os(SOLVER_ROOT_VAR).map(PathBuf::from)),
        config_path: cli.config,
        build_timeout: parse_timeout_arg(cli.build_timeout)?,
        launch_timeout: parse_timeout_arg(cli.launch_timeout)?,
        generate_mesh: cli.generate_mesh,
    };

    let config = RunConfig::resolve(cli.worker_count.as_deref(), overrides, &workdir)
        .map_err(|source| StageFailure::new(Stage::ResolveConfig, source))?;

    let pipeline = Pipeline::new(config, SubprocessManager::production());

    if cli.dry_run {
        print!("{}", pipeline.plan()?);
        return Ok(());
    }

    pipeline.run().await?;
    Ok(())
}

fn parse_timeout_arg(raw: Option<String>) -> Result<Option<Duration>, StageFailure> {
    raw.map(|s| config::parse_timeout(&s))
        .transpose()
        .map_err(|source| StageFailure::new(Stage::ResolveConfig, source))
}
