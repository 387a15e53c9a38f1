use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Well-known file name the mesh generator reads its input from.
pub const MESH_DESCRIPTOR_FILE: &str = "mesh.in";

/// Input for the external mesh generator: the case name, then the
/// refinement tolerance, one per line.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDescriptor {
    pub case: String,
    pub tolerance: f64,
}

impl MeshDescriptor {
    pub fn new(case: &str, tolerance: f64) -> Self {
        Self {
            case: case.to_string(),
            tolerance,
        }
    }

    /// Exact file contents, also fed to the mesh generator's stdin when
    /// the pipeline runs it directly.
    pub fn contents(&self) -> String {
        format!("{}\n{}\n", self.case, self.tolerance)
    }

    /// Write the descriptor into `workdir`, replacing prior content.
    pub fn write(&self, workdir: &Path) -> Result<PathBuf> {
        let path = workdir.join(MESH_DESCRIPTOR_FILE);
        fs::write(&path, self.contents()).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
