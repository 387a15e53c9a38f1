use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::error::ProcessError;

/// Fully-resolved invocation of one external tool.
///
/// The environment map is overlaid on the orchestrator's own
/// environment, so toolchain state reaches the child without mutating
/// the parent process.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

impl ProcessCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }

    /// The command as it would appear on a shell line, for logs and the
    /// dry-run plan.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// Scripted output for the mock runner and tests.
    pub fn with_status(status: ExitStatus) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            _ => None,
        }
    }
}

/// Executes external tool invocations. The production implementation
/// spawns real processes; the mock implementation serves scripted
/// responses and records calls for assertions.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Production runner on `tokio::process`.
///
/// Each child runs in its own process group. On deadline expiry the
/// whole group is terminated (SIGTERM, then SIGKILL after a grace
/// period); an interrupt of the orchestrator is forwarded to the group
/// so no worker processes are left orphaned.
pub struct TokioProcessRunner;

/// Grace period between SIGTERM and SIGKILL when a deadline expires.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

impl TokioProcessRunner {
    fn configure(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);

        // Own process group, so timeout and interrupt handling can reach
        // every worker the launcher forks.
        #[cfg(unix)]
        cmd.process_group(0);

        // Overlay on the inherited environment; PATH and the toolchain
        // root variable shadow the parent's values.
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        cmd
    }

    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: command.display_line(),
                source: error,
            }
        }
    }

    async fn write_stdin(
        child: &mut tokio::process::Child,
        input: &str,
    ) -> Result<(), ProcessError> {
        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        Ok(())
    }

    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitStatus::Signal(signal),
            None => ExitStatus::Error(1),
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    #[cfg(unix)]
    fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
        if let Some(pid) = pid {
            let group = nix::unistd::Pid::from_raw(pid as i32);
            if let Err(err) = nix::sys::signal::killpg(group, signal) {
                tracing::debug!("killpg({group}, {signal}) failed: {err}");
            }
        }
    }

    /// Terminate the child's process group after a deadline expiry.
    async fn terminate_group(pid: Option<u32>) {
        #[cfg(unix)]
        {
            Self::signal_group(pid, nix::sys::signal::Signal::SIGTERM);
            tokio::time::sleep(TERMINATE_GRACE).await;
            Self::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
        }
    }

    /// Wait for the child, forwarding any interrupt of the orchestrator
    /// to the child's process group.
    async fn wait_forwarding_interrupts(
        child: tokio::process::Child,
        pid: Option<u32>,
    ) -> Result<std::process::Output, ProcessError> {
        let output = child.wait_with_output();
        tokio::pin!(output);
        loop {
            tokio::select! {
                result = &mut output => return result.map_err(ProcessError::Io),
                interrupt = tokio::signal::ctrl_c() => {
                    if interrupt.is_ok() {
                        tracing::info!("interrupt received, forwarding to the running job");
                        #[cfg(unix)]
                        Self::signal_group(pid, nix::sys::signal::Signal::SIGINT);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();
        tracing::debug!("executing: {}", command.display_line());
        if let Some(dir) = &command.working_dir {
            tracing::trace!("working directory: {}", dir.display());
        }
        if !command.env.is_empty() {
            tracing::trace!("environment overlay: {:?}", command.env);
        }

        let mut cmd = Self::configure(&command);
        let mut child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;
        let pid = child.id();

        if let Some(input) = &command.stdin {
            Self::write_stdin(&mut child, input).await?;
        }

        let waited = Self::wait_forwarding_interrupts(child, pid);
        let (status, output) = match command.timeout {
            Some(limit) => match tokio::time::timeout(limit, waited).await {
                Ok(result) => {
                    let output = result?;
                    (Self::parse_exit_status(output.status), Some(output))
                }
                Err(_) => {
                    tracing::warn!(
                        "`{}` still running after {:?}, terminating its process group",
                        command.program,
                        limit
                    );
                    Self::terminate_group(pid).await;
                    (ExitStatus::Timeout, None)
                }
            },
            None => {
                let output = waited.await?;
                (Self::parse_exit_status(output.status), Some(output))
            }
        };

        let duration = start.elapsed();
        let result = ProcessOutput {
            status,
            stdout: output
                .as_ref()
                .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
                .unwrap_or_default(),
            stderr: output
                .as_ref()
                .map(|o| String::from_utf8_lossy(&o.stderr).to_string())
                .unwrap_or_default(),
            duration,
        };

        match &result.status {
            ExitStatus::Success => {
                tracing::debug!("`{}` finished in {:?}", command.program, duration)
            }
            ExitStatus::Error(code) => {
                tracing::debug!("`{}` exited with code {} in {:?}", command.program, code, duration)
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!("`{}` terminated by signal {}", command.program, signal)
            }
            ExitStatus::Timeout => {
                tracing::warn!("`{}` timed out after {:?}", command.program, duration)
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessCommand {
        ProcessCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_and_success() {
        let output = TokioProcessRunner.run(sh("echo hello")).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let output = TokioProcessRunner.run(sh("exit 3")).await.unwrap();
        assert_eq!(output.status, ExitStatus::Error(3));
    }

    #[tokio::test]
    async fn feeds_stdin_to_the_child() {
        let command = sh("cat").stdin("paddle\n0.01\n".to_string());
        let output = TokioProcessRunner.run(command).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, "paddle\n0.01\n");
    }

    #[tokio::test]
    async fn overlays_environment_on_the_child() {
        let command = sh("printf '%s' \"$SOLVER_ROOT\"").envs([("SOLVER_ROOT", "/opt/solver")]);
        let output = TokioProcessRunner.run(command).await.unwrap();
        assert_eq!(output.stdout, "/opt/solver");
    }

    #[tokio::test]
    async fn deadline_expiry_reports_timeout() {
        let command = sh("sleep 5").timeout(Some(Duration::from_millis(50)));
        let output = TokioProcessRunner.run(command).await.unwrap();
        assert_eq!(output.status, ExitStatus::Timeout);
    }

    #[tokio::test]
    async fn missing_binary_is_command_not_found() {
        let command = ProcessCommand::new("no-such-tool-462913");
        let err = TokioProcessRunner.run(command).await.unwrap_err();
        match err {
            ProcessError::CommandNotFound(program) => {
                assert_eq!(program, "no-such-tool-462913")
            }
            other => panic!("expected CommandNotFound, got {other:?}"),
        }
    }

    #[test]
    fn display_line_joins_program_and_args() {
        let command = ProcessCommand::new("mpirun").args(["-np", "4", "./paddle"]);
        assert_eq!(command.display_line(), "mpirun -np 4 ./paddle");
    }
}
