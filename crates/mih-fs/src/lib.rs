use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

pub use crate::file_lock::{DEFAULT_POLL_INTERVAL, FileLock, FileLockGuard, LockError, LockStrategy};
pub use crate::path::*;
pub use crate::walk::{Exclusions, files_excluding, mtime, system_time_to_seconds};

mod file_lock;
mod path;
mod walk;

/// Return a [`NamedTempFile`] in the specified directory.
///
/// Sets the permissions of the temporary file to `0o666`, to match the non-temporary file default.
/// ([`NamedTempFile`] defaults to `0o600`.)
#[cfg(unix)]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(path)
}

/// Return a [`NamedTempFile`] in the specified directory.
#[cfg(not(unix))]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new().tempfile_in(path)
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
///
/// Readers never observe a partially written file.
pub fn write_atomic_sync(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("`{}` has no parent directory", path.user_display()),
        )
    })?;
    let temp_file = tempfile_in(parent)?;
    fs_err::write(&temp_file, &data)?;
    temp_file.persist(path).map_err(|err| {
        std::io::Error::other(format!(
            "Failed to persist temporary file to {}: {}",
            path.user_display(),
            err.error
        ))
    })?;
    Ok(())
}

/// Iterate over the entries of a directory, skipping (and logging) unreadable ones.
///
/// If the directory does not exist, returns an empty iterator.
pub fn entries(path: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    path.as_ref()
        .read_dir()
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!("Failed to read entry: {err}");
                None
            }
        })
}

/// Remove a directory and everything in it, treating a missing directory as success.
pub fn remove_dir_all_if_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    match fs_err::remove_dir_all(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
