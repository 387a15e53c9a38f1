//! # caserun
//!
//! Case-orchestration pipeline for parallel numerical-simulation runs.
//!
//! `caserun` coordinates the external tools of a solver toolchain in a
//! fixed sequence: it writes the mesh-generation and session descriptors
//! for a named case, resolves the toolchain environment, builds the
//! case's solver binary, and launches it under a parallel runtime with
//! the requested worker count. The mesh generator, build system, and
//! launcher are opaque collaborators reached only through their
//! command-line and file-based contracts.
//!
//! ## Modules
//!
//! - `config` - run configuration: invocation parameters, defaults, TOML file
//! - `descriptor` - the mesh and session descriptor artifacts
//! - `toolchain` - solver toolchain environment resolution
//! - `subprocess` - unified subprocess abstraction layer for testing
//! - `pipeline` - the sequential stage orchestrator
pub mod config;
pub mod descriptor;
pub mod error;
pub mod pipeline;
pub mod subprocess;
pub mod toolchain;

pub use error::{Error, Result};
