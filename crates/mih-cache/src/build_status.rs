use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The record of one successful build triggered by the import hook.
///
/// Compared against the current state of the source tree and installed artifact to decide
/// whether a rebuild is necessary. Records are overwritten, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// The modification time of the installed artifact, in seconds since the Unix epoch, as
    /// observed right after the build.
    pub build_mtime: f64,
    /// The project directory or single source file that was built.
    pub source_path: PathBuf,
    /// The arguments passed to the build tool.
    #[serde(alias = "maturin_args")]
    pub build_args: Vec<String>,
    /// The combined output of the build tool.
    #[serde(alias = "maturin_output")]
    pub build_output: String,
}
