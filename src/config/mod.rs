//! Run configuration.
//!
//! Resolution precedence: CLI overrides, then an optional TOML config
//! file (`caserun.toml` in the working directory, or an explicit
//! `--config` path), then built-in defaults. This module is the sole
//! input-validation boundary of the pipeline; every downstream stage
//! trusts the resolved [`RunConfig`] without re-validating.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default simulation case.
pub const DEFAULT_CASE: &str = "paddle";

/// Default mesh refinement tolerance. Must be > 0; typically a small
/// fraction.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Config file picked up from the working directory when present.
pub const CONFIG_FILE_NAME: &str = "caserun.toml";

/// Toolchain submodule directory tried when `SOLVER_ROOT` is unset.
const DEFAULT_TOOLCHAIN_DIR: &str = "solver";

const DEFAULT_MESH_TOOL: &str = "genmesh";
const DEFAULT_BUILD_TOOL: &str = "makecase";
const DEFAULT_LAUNCHER: &str = "mpirun";

/// Validated invocation parameters: the worker count for the parallel
/// launch. Immutable for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationParams {
    pub workers: u32,
}

/// Validate the raw positional worker-count argument.
///
/// Pure: no file or subprocess side effects may happen before this
/// succeeds.
pub fn resolve_worker_count(raw: Option<&str>) -> Result<InvocationParams> {
    let raw = raw.ok_or_else(|| Error::Config("missing worker count argument".to_string()))?;
    let workers: u32 = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "worker count must be a positive integer, got `{raw}`"
        ))
    })?;
    if workers == 0 {
        return Err(Error::Config(
            "worker count must be a positive integer, got `0`".to_string(),
        ));
    }
    Ok(InvocationParams { workers })
}

/// Parse a human-readable duration such as `"30s"` or `"12h"`.
pub fn parse_timeout(raw: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(raw)
        .map_err(|err| Error::Config(format!("invalid duration `{raw}`: {err}")))
}

/// On-disk configuration, all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub case: Option<String>,
    pub tolerance: Option<f64>,
    pub toolchain_root: Option<PathBuf>,
    pub mesh_tool: Option<String>,
    pub build_tool: Option<String>,
    pub launcher: Option<String>,
    pub executable: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub mesh_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub build_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub launch_timeout: Option<Duration>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw)
            .map_err(|err| Error::Config(format!("malformed config {}: {err}", path.display())))
    }

    /// Load `caserun.toml` from `workdir` when present; defaults
    /// otherwise.
    pub fn discover(workdir: &Path) -> Result<Self> {
        let path = workdir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Command-line overrides, highest precedence.
#[derive(Debug, Default)]
pub struct Overrides {
    pub case: Option<String>,
    pub tolerance: Option<f64>,
    /// From `--toolchain-root`, falling back to the `SOLVER_ROOT`
    /// environment variable (resolved at the binary boundary).
    pub toolchain_root: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub build_timeout: Option<Duration>,
    pub launch_timeout: Option<Duration>,
    pub generate_mesh: bool,
}

/// Fully-resolved configuration for one run. The case name is resolved
/// once here and threaded through every stage, which is what keeps the
/// mesh descriptor, session descriptor, and build target identical.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub case: String,
    pub tolerance: f64,
    pub workers: u32,
    /// Absolute working directory of the run.
    pub workdir: PathBuf,
    pub toolchain_root: PathBuf,
    pub mesh_tool: String,
    pub build_tool: String,
    pub launcher: String,
    /// Executable the launcher runs; the build tool is expected to have
    /// emitted it in the working directory.
    pub executable: PathBuf,
    pub mesh_timeout: Option<Duration>,
    pub build_timeout: Option<Duration>,
    pub launch_timeout: Option<Duration>,
    /// Run the mesh generator on the freshly written descriptor before
    /// building.
    pub generate_mesh: bool,
}

impl RunConfig {
    /// Resolve and validate the whole configuration. Fails with a
    /// `ConfigurationError` before any stage side effect.
    pub fn resolve(raw_workers: Option<&str>, overrides: Overrides, workdir: &Path) -> Result<Self> {
        let params = resolve_worker_count(raw_workers)?;

        let workdir = workdir.canonicalize().map_err(|source| Error::Io {
            path: workdir.to_path_buf(),
            source,
        })?;

        let file = match &overrides.config_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::discover(&workdir)?,
        };

        let case = overrides
            .case
            .or(file.case)
            .unwrap_or_else(|| DEFAULT_CASE.to_string());
        validate_case_name(&case)?;

        let tolerance = overrides
            .tolerance
            .or(file.tolerance)
            .unwrap_or(DEFAULT_TOLERANCE);
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be a positive number, got `{tolerance}`"
            )));
        }

        let toolchain_root = overrides
            .toolchain_root
            .or(file.toolchain_root)
            .unwrap_or_else(|| workdir.join(DEFAULT_TOOLCHAIN_DIR));

        let executable = file
            .executable
            .unwrap_or_else(|| PathBuf::from(format!("./{case}")));

        Ok(Self {
            tolerance,
            workers: params.workers,
            workdir,
            toolchain_root,
            mesh_tool: file.mesh_tool.unwrap_or_else(|| DEFAULT_MESH_TOOL.to_string()),
            build_tool: file
                .build_tool
                .unwrap_or_else(|| DEFAULT_BUILD_TOOL.to_string()),
            launcher: file.launcher.unwrap_or_else(|| DEFAULT_LAUNCHER.to_string()),
            executable,
            mesh_timeout: file.mesh_timeout,
            build_timeout: overrides.build_timeout.or(file.build_timeout),
            launch_timeout: overrides.launch_timeout.or(file.launch_timeout),
            generate_mesh: overrides.generate_mesh,
            case,
        })
    }
}

/// The case name becomes a file name and a build target; reject values
/// that could not be either.
fn validate_case_name(case: &str) -> Result<()> {
    if case.is_empty() {
        return Err(Error::Config("case name must not be empty".to_string()));
    }
    if case.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
        return Err(Error::Config(format!(
            "case name `{case}` must not contain whitespace or path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_accepts_positive_integers() {
        assert_eq!(resolve_worker_count(Some("4")).unwrap().workers, 4);
        assert_eq!(resolve_worker_count(Some(" 16 ")).unwrap().workers, 16);
    }

    #[test]
    fn worker_count_rejects_missing_value() {
        assert!(matches!(
            resolve_worker_count(None).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn worker_count_rejects_non_numeric_and_non_positive() {
        for raw in ["four", "4.5", "-2", "0", ""] {
            let err = resolve_worker_count(Some(raw)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "`{raw}` should be rejected");
        }
    }

    #[test]
    fn defaults_apply_without_file_or_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            RunConfig::resolve(Some("4"), Overrides::default(), dir.path()).unwrap();

        assert_eq!(config.case, DEFAULT_CASE);
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.workers, 4);
        assert_eq!(config.mesh_tool, "genmesh");
        assert_eq!(config.build_tool, "makecase");
        assert_eq!(config.launcher, "mpirun");
        assert_eq!(config.executable, PathBuf::from("./paddle"));
        assert!(config.workdir.is_absolute());
        assert!(config.build_timeout.is_none());
    }

    #[test]
    fn config_file_is_discovered_in_the_workdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "case = \"impeller\"\ntolerance = 0.05\nbuild_timeout = \"10m\"\n",
        )
        .unwrap();

        let config =
            RunConfig::resolve(Some("8"), Overrides::default(), dir.path()).unwrap();
        assert_eq!(config.case, "impeller");
        assert_eq!(config.tolerance, 0.05);
        assert_eq!(config.build_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.executable, PathBuf::from("./impeller"));
    }

    #[test]
    fn cli_overrides_beat_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "case = \"impeller\"\n").unwrap();

        let overrides = Overrides {
            case: Some("paddle".to_string()),
            tolerance: Some(0.2),
            ..Overrides::default()
        };
        let config = RunConfig::resolve(Some("2"), overrides, dir.path()).unwrap();
        assert_eq!(config.case, "paddle");
        assert_eq!(config.tolerance, 0.2);
    }

    #[test]
    fn malformed_config_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "tolerance = \"lots\"\n").unwrap();

        let err =
            RunConfig::resolve(Some("2"), Overrides::default(), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "tollerance = 0.1\n").unwrap();

        let err =
            RunConfig::resolve(Some("2"), Overrides::default(), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in [0.0, -0.01, f64::NAN] {
            let overrides = Overrides {
                tolerance: Some(bad),
                ..Overrides::default()
            };
            let err = RunConfig::resolve(Some("2"), overrides, dir.path()).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn case_names_with_separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["", "two words", "a/b"] {
            let overrides = Overrides {
                case: Some(bad.to_string()),
                ..Overrides::default()
            };
            let err = RunConfig::resolve(Some("2"), overrides, dir.path()).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "`{bad}` should be rejected");
        }
    }

    #[test]
    fn toolchain_root_defaults_to_the_solver_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            RunConfig::resolve(Some("2"), Overrides::default(), dir.path()).unwrap();
        assert_eq!(config.toolchain_root, config.workdir.join("solver"));
    }

    #[test]
    fn parse_timeout_understands_humantime() {
        assert_eq!(parse_timeout("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timeout("2h").unwrap(), Duration::from_secs(7200));
        assert!(parse_timeout("soon").is_err());
    }
}
