//! The sequential run pipeline.
//!
//! Stages run strictly in order, each one's artifact a precondition for
//! the next:
//!
//! `Start → ConfigResolved → MeshDescriptorWritten →
//! SessionDescriptorWritten → EnvironmentConfigured → (Meshed) → Built →
//! Launched → Done`
//!
//! Any stage failure is terminal and surfaces as a [`StageFailure`]
//! naming the stage and the underlying cause; no stage is retried or
//! re-entered. The parenthesized mesh stage only runs when the
//! configuration opts in.

pub mod build;
pub mod launch;
pub mod meshgen;

use std::fmt;

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::descriptor::{MeshDescriptor, SessionDescriptor};
use crate::error::{Error, Result};
use crate::subprocess::SubprocessManager;
use crate::toolchain::ToolchainEnv;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveConfig,
    WriteMeshDescriptor,
    WriteSessionDescriptor,
    ConfigureToolchain,
    GenerateMesh,
    Build,
    Launch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveConfig => "resolve-config",
            Stage::WriteMeshDescriptor => "write-mesh-descriptor",
            Stage::WriteSessionDescriptor => "write-session-descriptor",
            Stage::ConfigureToolchain => "configure-toolchain",
            Stage::GenerateMesh => "generate-mesh",
            Stage::Build => "build",
            Stage::Launch => "launch",
        };
        f.write_str(name)
    }
}

/// Terminal pipeline failure: which stage failed and why.
#[derive(Debug, thiserror::Error)]
#[error("stage `{stage}` failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl StageFailure {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

/// Tag a stage's result with its stage name on failure.
fn at<T>(stage: Stage, result: Result<T>) -> std::result::Result<T, StageFailure> {
    result.map_err(|source| StageFailure::new(stage, source))
}

/// Orchestrates one case run over a resolved configuration.
pub struct Pipeline {
    config: RunConfig,
    subprocess: SubprocessManager,
}

impl Pipeline {
    pub fn new(config: RunConfig, subprocess: SubprocessManager) -> Self {
        Self { config, subprocess }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every stage to completion, stopping at the first failure.
    pub async fn run(&self) -> std::result::Result<(), StageFailure> {
        let config = &self.config;
        let runner = self.subprocess.runner();

        info!(
            "starting case run: case `{}`, {} workers, workdir {}",
            config.case,
            config.workers,
            config.workdir.display()
        );

        let mesh = MeshDescriptor::new(&config.case, config.tolerance);
        let mesh_path = at(Stage::WriteMeshDescriptor, mesh.write(&config.workdir))?;
        debug!("wrote {}", mesh_path.display());

        let session = at(
            Stage::WriteSessionDescriptor,
            SessionDescriptor::new(&config.case, &config.workdir),
        )?;
        let session_path = at(Stage::WriteSessionDescriptor, session.write())?;
        debug!("wrote {}", session_path.display());

        let toolchain = at(
            Stage::ConfigureToolchain,
            ToolchainEnv::resolve(&config.toolchain_root),
        )?;
        debug!(
            "toolchain configured: root {}, search path {}",
            toolchain.root().display(),
            toolchain.search_path()
        );

        if config.generate_mesh {
            at(
                Stage::GenerateMesh,
                meshgen::run(runner.as_ref(), config, &toolchain, &mesh).await,
            )?;
        }

        at(
            Stage::Build,
            build::run(runner.as_ref(), config, &toolchain).await,
        )?;

        at(
            Stage::Launch,
            launch::run(runner.as_ref(), config, &toolchain).await,
        )?;

        info!("case run complete");
        Ok(())
    }

    /// Describe what a run would do, without writing files or spawning
    /// processes.
    pub fn plan(&self) -> std::result::Result<String, StageFailure> {
        let config = &self.config;
        let mesh = MeshDescriptor::new(&config.case, config.tolerance);
        let session = at(
            Stage::WriteSessionDescriptor,
            SessionDescriptor::new(&config.case, &config.workdir),
        )?;

        let mut lines = vec![
            format!("case:           {}", config.case),
            format!("workers:        {}", config.workers),
            format!("workdir:        {}", config.workdir.display()),
            format!("toolchain root: {}", config.toolchain_root.display()),
            String::new(),
            format!(
                "write {}: {:?}",
                crate::descriptor::mesh::MESH_DESCRIPTOR_FILE,
                mesh.contents()
            ),
            format!(
                "write {}: {:?}",
                crate::descriptor::session::SESSION_DESCRIPTOR_FILE,
                session.contents()
            ),
        ];
        if config.generate_mesh {
            lines.push(format!(
                "run: {} (descriptor on stdin)",
                meshgen::command(config, &mesh).display_line()
            ));
        }
        lines.push(format!("run: {}", build::command(config).display_line()));
        lines.push(format!("run: {}", launch::command(config).display_line()));
        lines.push(String::new());

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config(workdir: &std::path::Path) -> RunConfig {
        RunConfig {
            case: "paddle".to_string(),
            tolerance: 0.01,
            workers: 4,
            workdir: workdir.canonicalize().unwrap(),
            toolchain_root: workdir.join("solver"),
            mesh_tool: "genmesh".to_string(),
            build_tool: "makecase".to_string(),
            launcher: "mpirun".to_string(),
            executable: PathBuf::from("./paddle"),
            mesh_timeout: None,
            build_timeout: None,
            launch_timeout: None,
            generate_mesh: false,
        }
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Build.to_string(), "build");
        assert_eq!(Stage::Launch.to_string(), "launch");
        assert_eq!(Stage::ResolveConfig.to_string(), "resolve-config");
    }

    #[test]
    fn stage_failure_message_names_the_stage() {
        let failure = StageFailure::new(Stage::Build, Error::Config("x".to_string()));
        assert!(failure.to_string().starts_with("stage `build` failed"));
    }

    #[test]
    fn plan_lists_descriptors_and_commands() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("solver")).unwrap();
        let pipeline = Pipeline::new(
            test_config(dir.path()),
            crate::subprocess::SubprocessManager::mock().0,
        );

        let plan = pipeline.plan().unwrap();
        assert!(plan.contains("makecase paddle"));
        assert!(plan.contains("mpirun -np 4 ./paddle"));
        assert!(plan.contains("mesh.in"));
        assert!(plan.contains("SESSION.NAME"));
        // Plan must not create the descriptors.
        assert!(!dir.path().join("mesh.in").exists());
        assert!(!dir.path().join("SESSION.NAME").exists());
    }

    #[tokio::test]
    async fn mesh_stage_runs_before_build_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("solver")).unwrap();

        let (manager, mock) = crate::subprocess::SubprocessManager::mock();
        mock.script_success("genmesh");
        mock.script_success("makecase");
        mock.script_success("mpirun");

        let mut config = test_config(dir.path());
        config.generate_mesh = true;
        Pipeline::new(config, manager).run().await.unwrap();

        let programs: Vec<String> = mock.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(programs, vec!["genmesh", "makecase", "mpirun"]);

        let mesh_calls = mock.calls_to("genmesh");
        assert_eq!(mesh_calls[0].stdin.as_deref(), Some("paddle\n0.01\n"));
    }
}
