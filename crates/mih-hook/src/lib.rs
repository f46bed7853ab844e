use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use mih_build::BuildBackend;
use mih_fs::{LockError, Simplified};
use mih_python::Interpreter;

pub use crate::meta_path::{Finder, HookHandle, LoadedModules, MetaPath, PathFinder};
pub use crate::options::{Combine, HookOptions, HookSettings, LockTimeout, OptionsError};
pub use crate::project::ProjectFinder;
pub use crate::rust_file::RustFileFinder;

mod meta_path;
mod options;
mod project;
mod rust_file;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Lock(LockError),
    #[error(transparent)]
    Cache(mih_cache::Error),
    #[error("Failed to build `{module}`")]
    BuildFailed {
        module: String,
        #[source]
        err: mih_build::Error,
    },
    #[error("Cannot find package `{0}` after installation")]
    NotFoundAfterBuild(String),
    #[error("Cannot find module `{module}` in `{}` after building", dir.user_display())]
    LoadAfterBuild { module: String, dir: PathBuf },
    #[error("Cargo manifest not found in the project generated for `{}`", _0.user_display())]
    ManifestNotFound(PathBuf),
    #[error("No module named `{0}`")]
    ModuleNotFound(String),
    #[error("`{0}` is not a package")]
    NotAPackage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<mih_cache::Error> for ImportError {
    fn from(err: mih_cache::Error) -> Self {
        match err {
            mih_cache::Error::Lock(err) => Self::Lock(err),
            err => Self::Cache(err),
        }
    }
}

/// The finders added to a [`MetaPath`] by [`install`].
#[derive(Debug)]
#[must_use]
pub struct InstalledHooks {
    project: Option<HookHandle>,
    rust_file: Option<HookHandle>,
}

impl InstalledHooks {
    pub fn has_project_finder(&self) -> bool {
        self.project.is_some()
    }

    pub fn has_rust_file_finder(&self) -> bool {
        self.rust_file.is_some()
    }
}

/// Install the import hooks enabled in `settings` in front of the finders of `meta_path`.
///
/// When both are enabled, the project finder is consulted before the single-file finder.
pub fn install(
    meta_path: &mut MetaPath,
    settings: &HookSettings,
    interpreter: &Arc<Interpreter>,
    backend: &Arc<dyn BuildBackend>,
) -> Result<InstalledHooks, ImportError> {
    let rust_file = if settings.enable_rs_file_importer {
        let finder = RustFileFinder::new(settings, interpreter.clone(), backend.clone())?;
        Some(meta_path.install(Arc::new(finder)))
    } else {
        None
    };
    let project = if settings.enable_project_importer {
        let finder = ProjectFinder::new(settings, interpreter.clone(), backend.clone())?;
        Some(meta_path.install(Arc::new(finder)))
    } else {
        None
    };
    debug!(
        "Installed import hooks using build directory `{}`",
        settings.build_dir.user_display()
    );
    Ok(InstalledHooks { project, rust_file })
}

/// Remove the import hooks added by [`install`].
pub fn uninstall(meta_path: &mut MetaPath, hooks: InstalledHooks) {
    let InstalledHooks { project, rust_file } = hooks;
    for handle in [project, rust_file].into_iter().flatten() {
        meta_path.uninstall(handle);
    }
}
