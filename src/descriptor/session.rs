use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Well-known file name the solver reads at startup to resolve its I/O
/// roots.
pub const SESSION_DESCRIPTOR_FILE: &str = "SESSION.NAME";

/// Session identity for the solver: the case name, then the absolute
/// working directory, one per line.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptor {
    case: String,
    workdir: PathBuf,
}

impl SessionDescriptor {
    /// Resolves `workdir` to an absolute path immediately. The solver
    /// process may start later with a different relative-path context,
    /// so deferring resolution would point it at the wrong directory.
    pub fn new(case: &str, workdir: &Path) -> Result<Self> {
        let workdir = workdir.canonicalize().map_err(|source| Error::Io {
            path: workdir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            case: case.to_string(),
            workdir,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn contents(&self) -> String {
        format!("{}\n{}\n", self.case, self.workdir.display())
    }

    /// Write the descriptor into its working directory, replacing prior
    /// content.
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.workdir.join(SESSION_DESCRIPTOR_FILE);
        fs::write(&path, self.contents()).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
