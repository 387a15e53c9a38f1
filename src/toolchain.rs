//! Solver toolchain environment resolution.
//!
//! The build tool and the launcher both need to find the toolchain's
//! scripts and binaries. Rather than mutating the orchestrator's own
//! process environment, the resolved state is carried as an explicit
//! value and overlaid onto each subprocess invocation.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the toolchain root, both consumed (to
/// locate the toolchain) and exported to every downstream tool.
pub const SOLVER_ROOT_VAR: &str = "SOLVER_ROOT";

/// Subdirectory of the toolchain root holding its executables.
const BIN_DIR: &str = "bin";

/// Resolved toolchain environment: the root path and a search path with
/// the toolchain's bin directory prepended, so toolchain binaries
/// shadow same-named system binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolchainEnv {
    root: PathBuf,
    search_path: String,
}

impl ToolchainEnv {
    /// Resolve against the orchestrator's current `PATH`.
    ///
    /// Fails when the root directory does not exist: every downstream
    /// stage depends on the toolchain being where the configuration
    /// says it is, and a missing root would otherwise surface much
    /// later as an opaque "command not found" from the build tool.
    pub fn resolve(root: &Path) -> Result<Self> {
        Self::resolve_with_search_path(root, env::var_os("PATH"))
    }

    fn resolve_with_search_path(root: &Path, existing: Option<OsString>) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "toolchain root {} does not exist or is not a directory",
                root.display()
            )));
        }

        let bin = root.join(BIN_DIR);
        let joined = match existing {
            Some(existing) => {
                env::join_paths(std::iter::once(bin).chain(env::split_paths(&existing))).map_err(
                    |err| Error::Config(format!("cannot extend search path: {err}")),
                )?
            }
            None => bin.into_os_string(),
        };

        Ok(Self {
            root: root.to_path_buf(),
            search_path: joined.to_string_lossy().into_owned(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }

    /// Variables overlaid onto each subprocess environment.
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            (SOLVER_ROOT_VAR.to_string(), self.root.display().to_string()),
            ("PATH".to_string(), self.search_path.clone()),
        ]
    }
}
