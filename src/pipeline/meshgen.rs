//! Opt-in mesh-generation stage.
//!
//! The mesh generator consumes the mesh descriptor on standard input,
//! the same content the descriptor file carries. The default pipeline
//! skips this stage and leaves the generator to be run out of band.

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::descriptor::MeshDescriptor;
use crate::error::{Error, Result};
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessRunner};
use crate::toolchain::ToolchainEnv;

pub(crate) fn command(config: &RunConfig, descriptor: &MeshDescriptor) -> ProcessCommand {
    ProcessCommand::new(&config.mesh_tool)
        .current_dir(&config.workdir)
        .timeout(config.mesh_timeout)
        .stdin(descriptor.contents())
}

pub async fn run(
    runner: &dyn ProcessRunner,
    config: &RunConfig,
    toolchain: &ToolchainEnv,
    descriptor: &MeshDescriptor,
) -> Result<()> {
    info!(
        "generating mesh for case `{}` with `{}`",
        config.case, config.mesh_tool
    );
    let command = command(config, descriptor).envs(toolchain.vars());
    let output = runner.run(command).await?;

    match output.status {
        ExitStatus::Success => {
            debug!("mesh generation finished in {:?}", output.duration);
            Ok(())
        }
        ExitStatus::Timeout => Err(Error::timed_out(&config.mesh_tool, config.mesh_timeout)),
        status => Err(Error::mesh_failed(
            &config.mesh_tool,
            &status,
            &output.stderr,
        )),
    }
}
