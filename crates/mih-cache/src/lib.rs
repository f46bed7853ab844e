use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use mih_fs::{FileLock, FileLockGuard, LockError, Simplified};
use mih_static::EnvVars;

pub use crate::build_status::BuildStatus;

mod build_status;

/// The name of the lock file in the build directory.
const LOCK_FILE: &str = "lock";
/// The subdirectory holding one JSON [`BuildStatus`] per source path.
const BUILD_STATUS_DIR: &str = "build_status";
/// The subdirectory holding generated projects for single-file modules.
const PROJECT_DIR: &str = "project";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to serialize build status for `{}`", _0.user_display())]
    Json(PathBuf, #[source] serde_json::Error),
}

/// The directory shared by every import hook of one interpreter, guarded by a single
/// cross-process lock.
#[derive(Debug)]
pub struct BuildCache {
    root: PathBuf,
    lock: FileLock,
}

impl BuildCache {
    /// Initialize the build cache at `root`.
    ///
    /// Creates the directory, marks it as a cache and prepares (but does not take) the lock.
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Option<Duration>) -> Result<Self, Error> {
        let root = root.into();
        init(&root)?;
        let lock = FileLock::new(root.join(LOCK_FILE), lock_timeout)?;
        debug!("Using build cache at `{}`", root.user_display());
        Ok(Self { root, lock })
    }

    /// The root of the build cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block until the cache lock is held, returning a handle that allows access to the cache
    /// until it is dropped.
    pub fn lock(&mut self) -> Result<LockedBuildCache<'_>, Error> {
        let Self { root, lock } = self;
        let guard = lock.lock()?;
        Ok(LockedBuildCache {
            root: root.as_path(),
            _guard: guard,
        })
    }
}

/// Access to the contents of a [`BuildCache`], only available while its lock is held.
#[derive(Debug)]
pub struct LockedBuildCache<'cache> {
    root: &'cache Path,
    _guard: FileLockGuard<'cache>,
}

impl LockedBuildCache<'_> {
    /// The root of the build cache.
    pub fn root(&self) -> &Path {
        self.root
    }

    /// Read the last [`BuildStatus`] recorded for `source_path`.
    ///
    /// Returns `None` if there is no record, or if the record can't be read or parsed.
    pub fn get_build_status(&self, source_path: &Path) -> Option<BuildStatus> {
        let path = self.build_status_path(source_path);
        let contents = match fs_err::read(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                debug!("Failed to read build status: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&contents) {
            Ok(status) => Some(status),
            Err(err) => {
                debug!(
                    "Ignoring malformed build status at `{}`: {err}",
                    path.user_display()
                );
                None
            }
        }
    }

    /// Record the [`BuildStatus`] of a build, replacing any previous record for its source.
    pub fn store_build_status(&self, status: &BuildStatus) -> Result<(), Error> {
        let path = self.build_status_path(&status.source_path);
        fs_err::create_dir_all(self.root.join(BUILD_STATUS_DIR))?;
        let data = serde_json::to_string_pretty(status)
            .map_err(|err| Error::Json(status.source_path.clone(), err))?;
        mih_fs::write_atomic_sync(&path, data)?;
        debug!(
            "Stored build status for `{}`",
            status.source_path.user_display()
        );
        Ok(())
    }

    /// The scratch directory used to build the single-file module `module_name` found at
    /// `project_path`.
    ///
    /// Deterministic for a given input, and distinct for distinct inputs.
    pub fn scratch_dir(&self, project_path: &Path, module_name: &str) -> PathBuf {
        self.root
            .join(PROJECT_DIR)
            .join(format!("{module_name}_{}", path_digest(project_path)))
    }

    /// Remove every build status and scratch directory, keeping the lock in place.
    pub fn clear(&self) -> Result<(), Error> {
        for dir in [BUILD_STATUS_DIR, PROJECT_DIR] {
            mih_fs::remove_dir_all_if_exists(self.root.join(dir))?;
        }
        Ok(())
    }

    /// The number of build statuses currently recorded.
    pub fn num_build_statuses(&self) -> usize {
        mih_fs::entries(self.root.join(BUILD_STATUS_DIR))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .count()
    }

    fn build_status_path(&self, source_path: &Path) -> PathBuf {
        self.root
            .join(BUILD_STATUS_DIR)
            .join(format!("{}.json", path_digest(source_path)))
    }
}

/// Return the build directory to use for the interpreter with the given version and
/// `sys.exec_prefix`.
///
/// In order of preference:
///
/// - `$MATURIN_BUILD_DIR/<version>_<hash>`
/// - `<exec_prefix>/maturin_build_cache`, if the prefix is writable (e.g. a virtual environment)
/// - `<user cache dir>/maturin_build_cache/<version>_<hash>`
pub fn default_build_dir(python_version: &str, exec_prefix: &Path) -> Result<PathBuf, Error> {
    let shared = if let Some(dir) = std::env::var_os(EnvVars::MATURIN_BUILD_DIR)
        .filter(|dir| !dir.is_empty())
    {
        PathBuf::from(dir)
    } else if mih_fs::is_writable(exec_prefix) {
        return Ok(exec_prefix.join("maturin_build_cache"));
    } else {
        mih_dirs::user_build_cache_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine the user cache directory",
            )
        })?
    };
    Ok(shared.join(format!("{python_version}_{}", path_digest(exec_prefix))))
}

/// The hex-encoded SHA-256 digest of a path.
fn path_digest(path: &Path) -> String {
    hex::encode(Sha256::digest(mih_fs::path_bytes(path)))
}

/// Create the cache directory and mark it as such.
fn init(root: &Path) -> Result<(), io::Error> {
    fs_err::create_dir_all(root)?;

    // Add the CACHEDIR.TAG.
    cachedir::ensure_tag(root)?;

    // Add the .gitignore.
    match fs_err::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(root.join(".gitignore"))
    {
        Ok(mut file) => file.write_all(b"*")?,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => (),
        Err(err) => return Err(err),
    }
    Ok(())
}
