//! Build stage: produce the solver binary for the case.

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessRunner};
use crate::toolchain::ToolchainEnv;

/// The build tool takes the case name as its sole argument and emits
/// the solver executable into the working directory.
pub(crate) fn command(config: &RunConfig) -> ProcessCommand {
    ProcessCommand::new(&config.build_tool)
        .arg(&config.case)
        .current_dir(&config.workdir)
        .timeout(config.build_timeout)
}

/// Invoke the build tool and block until it exits. Non-zero exit is a
/// `BuildError` and the pipeline must not proceed to launch.
pub async fn run(
    runner: &dyn ProcessRunner,
    config: &RunConfig,
    toolchain: &ToolchainEnv,
) -> Result<()> {
    info!(
        "building solver binary for case `{}` with `{}`",
        config.case, config.build_tool
    );
    let command = command(config).envs(toolchain.vars());
    let output = runner.run(command).await?;

    match output.status {
        ExitStatus::Success => {
            debug!("build finished in {:?}", output.duration);
            Ok(())
        }
        ExitStatus::Timeout => Err(Error::timed_out(&config.build_tool, config.build_timeout)),
        status => Err(Error::build_failed(
            &config.build_tool,
            &status,
            &output.stderr,
        )),
    }
}
