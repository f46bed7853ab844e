use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::debug;

use mih_build::{has_warnings, log_build_warnings};
use mih_cache::BuildStatus;
use mih_fs::{Exclusions, Simplified};

/// Directory names skipped when computing the modification time of a project or an installed
/// package, unless configured otherwise.
pub const DEFAULT_EXCLUDED_DIR_NAMES: &[&str] = &[
    "__pycache__",
    "target",
    "dist",
    ".git",
    "venv",
    ".venv",
    ".pytest_cache",
];

/// Modification times closer than this are considered equal.
const MTIME_TOLERANCE: f64 = 1e-6;

/// The sources an artifact was built from.
#[derive(Debug, Clone, Copy)]
pub enum SourceTree<'a> {
    /// A project directory and the path dependencies of its manifest.
    Project {
        root: &'a Path,
        path_dependencies: &'a [PathBuf],
    },
    /// A single source file.
    File(&'a Path),
}

impl SourceTree<'_> {
    /// The path build statuses are recorded under.
    pub fn source_path(&self) -> &Path {
        match self {
            Self::Project { root, .. } => root,
            Self::File(path) => path,
        }
    }
}

/// Why an artifact needs to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    ForcingRebuild,
    NotInstalled,
    NoInstalledMtime,
    NoProjectMtime,
    OutOfDate,
    NoBuildStatus,
    SourcePathMismatch,
    MtimeMismatch,
    ArgsMismatch,
}

impl Display for StaleReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ForcingRebuild => "forcing rebuild",
            Self::NotInstalled => "package/module not already installed",
            Self::NoInstalledMtime => "could not get installed mtime",
            Self::NoProjectMtime => "error computing project mtime",
            Self::OutOfDate => "package is out of date",
            Self::NoBuildStatus => "no build status found",
            Self::SourcePathMismatch => "source path mismatch",
            Self::MtimeMismatch => "installed mtime does not match build status",
            Self::ArgsMismatch => "current build args do not match the previous build",
        })
    }
}

/// The verdict of [`FreshnessOracle::check`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Freshness {
    /// The artifact can be used as is.
    Fresh { installed_mtime: f64 },
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

/// Compares an installed artifact against its sources and the record of the build that
/// produced it.
#[derive(Debug, Clone)]
pub struct FreshnessOracle {
    force_rebuild: bool,
    excluded_dir_names: FxHashSet<String>,
    show_warnings: bool,
}

impl Default for FreshnessOracle {
    fn default() -> Self {
        Self::new(
            false,
            DEFAULT_EXCLUDED_DIR_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
            true,
        )
    }
}

impl FreshnessOracle {
    pub fn new(
        force_rebuild: bool,
        excluded_dir_names: FxHashSet<String>,
        show_warnings: bool,
    ) -> Self {
        Self {
            force_rebuild,
            excluded_dir_names,
            show_warnings,
        }
    }

    pub fn force_rebuild(&self) -> bool {
        self.force_rebuild
    }

    pub fn excluded_dir_names(&self) -> &FxHashSet<String> {
        &self.excluded_dir_names
    }

    pub fn show_warnings(&self) -> bool {
        self.show_warnings
    }

    /// Decide whether `artifact`, the installed result of building `source` for the module
    /// `module_path`, can be used without rebuilding.
    ///
    /// `status` is the record of the last build of `source`, and `build_args` the flags the
    /// build would be run with now. When the artifact is fresh and the recorded build reported
    /// warnings, they are reported again.
    pub fn check(
        &self,
        module_path: &str,
        source: &SourceTree<'_>,
        artifact: Option<&Path>,
        status: Option<&BuildStatus>,
        build_args: &[String],
    ) -> Freshness {
        debug!("Checking whether `{module_path}` is up to date");

        if self.force_rebuild {
            return Freshness::Stale(StaleReason::ForcingRebuild);
        }

        let Some(artifact) = artifact else {
            return Freshness::Stale(StaleReason::NotInstalled);
        };

        let Some(installed_mtime) = self.installed_mtime(artifact) else {
            return Freshness::Stale(StaleReason::NoInstalledMtime);
        };

        let Some(project_mtime) = self.project_mtime(source, artifact) else {
            return Freshness::Stale(StaleReason::NoProjectMtime);
        };

        debug!(
            "installed mtime: {installed_mtime:.6} {} project mtime: {project_mtime:.6}",
            if installed_mtime >= project_mtime {
                ">="
            } else {
                "<"
            }
        );
        if installed_mtime < project_mtime {
            return Freshness::Stale(StaleReason::OutOfDate);
        }

        let Some(status) = status else {
            return Freshness::Stale(StaleReason::NoBuildStatus);
        };
        if status.source_path != source.source_path() {
            return Freshness::Stale(StaleReason::SourcePathMismatch);
        }
        if (status.build_mtime - installed_mtime).abs() >= MTIME_TOLERANCE {
            return Freshness::Stale(StaleReason::MtimeMismatch);
        }
        if status.build_args != build_args {
            return Freshness::Stale(StaleReason::ArgsMismatch);
        }

        debug!(
            "`{module_path}` is up to date (`{}`)",
            artifact.user_display()
        );
        if has_warnings(&status.build_output) {
            log_build_warnings(module_path, &status.build_output, false, self.show_warnings);
        }

        Freshness::Fresh { installed_mtime }
    }

    /// The modification time of an installed artifact.
    ///
    /// For a directory this is the oldest modification time of the files in it, i.e. the time
    /// the installation started; `None` if it contains no files. For a file it is the file's own
    /// modification time.
    pub fn installed_mtime(&self, artifact: &Path) -> Option<f64> {
        if artifact.is_dir() {
            let exclusions = Exclusions {
                names: &self.excluded_dir_names,
                paths: &[],
            };
            let mtime = fold_mtimes(
                mih_fs::files_excluding(artifact, exclusions),
                f64::min,
            );
            if mtime.is_none() {
                debug!("No installed files found in `{}`", artifact.user_display());
            }
            mtime
        } else {
            match mih_fs::mtime(artifact) {
                Ok(mtime) => Some(mtime),
                Err(err) => {
                    debug!(
                        "Failed to read mtime of `{}`: {err}",
                        artifact.user_display()
                    );
                    None
                }
            }
        }
    }

    /// The newest modification time of any file in `source`.
    ///
    /// For a project this covers the project directory and every path dependency, skipping
    /// excluded directory names and the installed artifact itself when it is a directory inside
    /// the project. `None` if any file can't be read or there are no files.
    pub fn project_mtime(&self, source: &SourceTree<'_>, artifact: &Path) -> Option<f64> {
        match source {
            SourceTree::Project {
                root,
                path_dependencies,
            } => {
                let excluded_paths = if artifact.is_dir() {
                    vec![artifact.to_path_buf()]
                } else {
                    Vec::new()
                };
                let exclusions = Exclusions {
                    names: &self.excluded_dir_names,
                    paths: &excluded_paths,
                };
                let files = std::iter::once(*root)
                    .chain(path_dependencies.iter().map(PathBuf::as_path))
                    .flat_map(|dir| mih_fs::files_excluding(dir, exclusions));
                let mtime = fold_mtimes(files, f64::max);
                if mtime.is_none() {
                    debug!("Failed to compute mtime of `{}`", root.user_display());
                }
                mtime
            }
            SourceTree::File(path) => match mih_fs::mtime(path) {
                Ok(mtime) => Some(mtime),
                Err(err) => {
                    debug!("Failed to read mtime of `{}`: {err}", path.user_display());
                    None
                }
            },
        }
    }
}

/// Combine the modification times of all `files`, or `None` if there are none or any of them
/// can't be read.
fn fold_mtimes(
    files: impl Iterator<Item = Result<PathBuf, walkdir::Error>>,
    combine: fn(f64, f64) -> f64,
) -> Option<f64> {
    let mut result = None;
    for file in files {
        let mtime = match file
            .map_err(std::io::Error::from)
            .and_then(|path| mih_fs::mtime(&path))
        {
            Ok(mtime) => mtime,
            Err(err) => {
                debug!("Failed to read mtime: {err}");
                return None;
            }
        };
        result = Some(result.map_or(mtime, |current| combine(current, mtime)));
    }
    result
}
