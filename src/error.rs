use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::subprocess::{ExitStatus, ProcessError};

/// Error kinds surfaced by the run pipeline.
///
/// Every stage failure aborts the pipeline immediately; nothing is
/// retried, since each stage has side effects (file writes, subprocess
/// launches) that are not safely repeatable without caller cleanup.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing invocation parameter, malformed config file, or a
    /// toolchain root that does not exist.
    #[error("configuration error: {0}")]
    Config(String),

    /// A descriptor artifact could not be written or a path resolved.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mesh generator exited non-zero.
    #[error("mesh generator `{tool}` failed: {detail}")]
    Mesh { tool: String, detail: String },

    /// The build tool exited non-zero; the launch stage is never reached.
    #[error("build tool `{tool}` failed: {detail}")]
    Build { tool: String, detail: String },

    /// The parallel launcher exited non-zero.
    #[error("launcher `{tool}` failed: {detail}")]
    Runtime { tool: String, detail: String },

    /// A subprocess stage exceeded its configured deadline.
    #[error("`{tool}` exceeded its {limit:?} deadline")]
    Timeout { tool: String, limit: Duration },

    /// The subprocess itself could not be run (spawn failure, missing
    /// binary, broken pipe).
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Result type for the `caserun` crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn mesh_failed(tool: &str, status: &ExitStatus, stderr: &str) -> Self {
        Error::Mesh {
            tool: tool.to_string(),
            detail: failure_detail(status, stderr),
        }
    }

    pub(crate) fn build_failed(tool: &str, status: &ExitStatus, stderr: &str) -> Self {
        Error::Build {
            tool: tool.to_string(),
            detail: failure_detail(status, stderr),
        }
    }

    pub(crate) fn launch_failed(tool: &str, status: &ExitStatus, stderr: &str) -> Self {
        Error::Runtime {
            tool: tool.to_string(),
            detail: failure_detail(status, stderr),
        }
    }

    pub(crate) fn timed_out(tool: &str, limit: Option<Duration>) -> Self {
        Error::Timeout {
            tool: tool.to_string(),
            limit: limit.unwrap_or_default(),
        }
    }
}

/// Render an exit status plus the tail of the tool's stderr into a
/// single diagnostic line.
fn failure_detail(status: &ExitStatus, stderr: &str) -> String {
    let status_str = match status {
        ExitStatus::Success => "exited successfully".to_string(),
        ExitStatus::Error(code) => format!("exit code {code}"),
        ExitStatus::Signal(signal) => format!("terminated by signal {signal}"),
        ExitStatus::Timeout => "timed out".to_string(),
    };
    match stderr_excerpt(stderr) {
        Some(excerpt) => format!("{status_str}\n{excerpt}"),
        None => status_str,
    }
}

/// Last few stderr lines, trimmed; `None` when the tool was silent.
fn stderr_excerpt(stderr: &str) -> Option<String> {
    const MAX_LINES: usize = 5;

    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    if lines.is_empty() || lines.iter().all(|l| l.trim().is_empty()) {
        return None;
    }
    let tail = &lines[lines.len().saturating_sub(MAX_LINES)..];
    Some(tail.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_detail_includes_exit_code() {
        let detail = failure_detail(&ExitStatus::Error(2), "");
        assert_eq!(detail, "exit code 2");
    }

    #[test]
    fn failure_detail_includes_signal() {
        let detail = failure_detail(&ExitStatus::Signal(9), "");
        assert_eq!(detail, "terminated by signal 9");
    }

    #[test]
    fn stderr_excerpt_keeps_only_the_tail() {
        let stderr = "one\ntwo\nthree\nfour\nfive\nsix\nseven\n";
        let excerpt = stderr_excerpt(stderr).unwrap();
        assert_eq!(excerpt, "three\nfour\nfive\nsix\nseven");
    }

    #[test]
    fn stderr_excerpt_is_none_for_blank_output() {
        assert!(stderr_excerpt("").is_none());
        assert!(stderr_excerpt("   \n  \n").is_none());
    }

    #[test]
    fn build_error_message_names_the_tool() {
        let err = Error::build_failed("makecase", &ExitStatus::Error(1), "ld: no such case\n");
        let msg = err.to_string();
        assert!(msg.contains("makecase"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("ld: no such case"));
    }
}
