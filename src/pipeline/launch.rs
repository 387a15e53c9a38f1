//! Launch stage: run the built solver under the parallel launcher.

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessRunner};
use crate::toolchain::ToolchainEnv;

/// The launcher takes the worker count and the executable path. It runs
/// in the working directory, so the solver it spawns can find the
/// session descriptor through its own working-directory resolution.
pub(crate) fn command(config: &RunConfig) -> ProcessCommand {
    let workers = config.workers.to_string();
    ProcessCommand::new(&config.launcher)
        .args(["-np", workers.as_str()])
        .arg(&config.executable.to_string_lossy())
        .current_dir(&config.workdir)
        .timeout(config.launch_timeout)
}

/// Invoke the launcher and block until every worker process has
/// terminated. Non-zero exit is a `RuntimeError`, terminal for this
/// invocation.
pub async fn run(
    runner: &dyn ProcessRunner,
    config: &RunConfig,
    toolchain: &ToolchainEnv,
) -> Result<()> {
    info!(
        "launching `{}` with {} workers via `{}`",
        config.executable.display(),
        config.workers,
        config.launcher
    );
    let command = command(config).envs(toolchain.vars());
    let output = runner.run(command).await?;

    match output.status {
        ExitStatus::Success => {
            debug!("parallel job finished in {:?}", output.duration);
            Ok(())
        }
        ExitStatus::Timeout => Err(Error::timed_out(&config.launcher, config.launch_timeout)),
        status => Err(Error::launch_failed(
            &config.launcher,
            &status,
            &output.stderr,
        )),
    }
}
