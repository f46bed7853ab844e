use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use owo_colors::OwoColorize;
use tracing::debug;

use mih_fs::Simplified;

pub use crate::backend::{BuildBackend, BuildGuard, MaturinBackend, check_supported};
pub use crate::output::{has_warnings, last_line, log_build_warnings};
pub use crate::settings::{BuildCommand, BuildSettings, CommandOptions, SettingsProvider};
pub use crate::wheel::{find_single_wheel, unpack_wheel};

mod backend;
mod output;
mod settings;
mod wheel;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to find `maturin`, is it installed?")]
    ToolNotFound(#[source] which::Error),
    #[error("Failed to run `{}`", _0.user_display())]
    CommandFailed(PathBuf, #[source] io::Error),
    #[error(transparent)]
    BuildFailed(#[from] BuildFailedError),
    #[error("The provided build settings do not support the `{0}` command")]
    UnsupportedCommand(BuildCommand),
    #[error("Expected exactly one wheel in `{}`", _0.user_display())]
    MissingWheel(PathBuf),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

/// `maturin` ran but exited with a non-zero status.
#[derive(Debug, thiserror::Error)]
pub struct BuildFailedError {
    /// The command line, for display.
    pub command: String,
    pub status: ExitStatus,
    /// The combined stdout and stderr.
    pub output: String,
}

impl Display for BuildFailedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` failed ({})", self.command, self.status)?;
        if !self.output.trim().is_empty() {
            write!(f, "\n\n{}\n{}", "[output]".red(), self.output.trim_end())?;
        }
        Ok(())
    }
}

/// Generate a project at `project_dir` that builds the single source file `rust_file` as an
/// extension module.
///
/// Anything at `project_dir` is removed first. Every feature requested by `settings` that is
/// not a feature of a dependency is declared as an empty feature of the generated crate, so
/// that the build accepts the flag. Returns the path to the generated manifest.
pub fn generate_project_for_single_rust_file(
    backend: &dyn BuildBackend,
    project_dir: &Path,
    rust_file: &Path,
    settings: &BuildSettings,
) -> Result<PathBuf, Error> {
    mih_fs::remove_dir_all_if_exists(project_dir)?;

    backend.new_project(project_dir)?;

    let manifest_path = project_dir.join("Cargo.toml");
    if let Some(features) = &settings.features {
        let manifest = fs_err::read_to_string(&manifest_path)?;
        let declared = features
            .iter()
            .filter(|feature| !feature.contains('/'))
            .map(|feature| format!("{feature} = []"))
            .collect::<Vec<_>>()
            .join("\n");
        fs_err::write(&manifest_path, format!("{manifest}\n[features]\n{declared}"))?;
    }

    fs_err::copy(rust_file, project_dir.join("src").join("lib.rs"))?;
    debug!(
        "Generated project for `{}` at `{}`",
        rust_file.user_display(),
        project_dir.user_display()
    );
    Ok(manifest_path)
}

/// Build a wheel for `interpreter` into an emptied `out_dir` and unpack it in place.
///
/// Returns the output of the build.
pub fn build_unpacked_wheel(
    backend: &dyn BuildBackend,
    manifest_path: &Path,
    interpreter: &Path,
    out_dir: &Path,
    settings: &BuildSettings,
) -> Result<String, Error> {
    mih_fs::remove_dir_all_if_exists(out_dir)?;
    let output = backend.build_wheel(manifest_path, interpreter, out_dir, settings)?;
    let wheel = find_single_wheel(out_dir)?;
    unpack_wheel(&wheel, out_dir)?;
    Ok(output)
}
