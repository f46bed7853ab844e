use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::TryLockError;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::Simplified;

/// The interval between two attempts at taking a busy lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Lock at `{}` is already held by this instance and is not reentrant", _0.user_display())]
    Reentrant(PathBuf),
    #[error("Failed to acquire lock `{}` in time ({:.1}s)", path.user_display(), timeout.as_secs_f64())]
    Timeout { path: PathBuf, timeout: Duration },
    #[error("File locking is not supported by the filesystem at `{}`", _0.user_display())]
    Unsupported(PathBuf),
    #[error("Failed to acquire lock `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

/// How exclusivity over the lock file is obtained.
///
/// All strategies guarantee that two [`FileLock`] instances on the same path, in different
/// processes, are never both locked at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockStrategy {
    /// An advisory lock over the whole file (`flock`).
    Advisory,
    /// A mandatory record lock (`LockFileEx`).
    Mandatory,
    /// Exclusive creation of a marker file, which is unlinked again on release.
    ///
    /// Works wherever the filesystem supports atomic `O_CREAT | O_EXCL`.
    AtomicCreate,
}

impl LockStrategy {
    /// The strategy supported by the platform the binary was compiled for.
    pub fn native() -> Self {
        if cfg!(unix) {
            Self::Advisory
        } else if cfg!(windows) {
            Self::Mandatory
        } else {
            Self::AtomicCreate
        }
    }
}

impl Display for LockStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advisory => f.write_str("advisory"),
            Self::Mandatory => f.write_str("mandatory"),
            Self::AtomicCreate => f.write_str("atomic-create"),
        }
    }
}

/// A cross-process lock on a file, acquired by polling.
///
/// The lock blocks the calling thread (never the whole process) while waiting, gives up after
/// the configured timeout, and is released when dropped.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    timeout: Option<Duration>,
    poll_interval: Duration,
    strategy: LockStrategy,
    /// The open lock file for the OS-backed strategies; the marker file while locked for
    /// [`LockStrategy::AtomicCreate`].
    file: Option<fs_err::File>,
    locked: bool,
}

impl FileLock {
    /// Create a lock on `path`, probing for the best supported [`LockStrategy`].
    ///
    /// A `timeout` of `None` waits forever.
    pub fn new(path: impl Into<PathBuf>, timeout: Option<Duration>) -> Result<Self, LockError> {
        Self::with_strategy(path, timeout, LockStrategy::native())
    }

    /// Create a lock on `path` using the given [`LockStrategy`].
    ///
    /// OS-backed strategies that turn out to be unsupported by the filesystem fall back to
    /// [`LockStrategy::AtomicCreate`], using a sibling `.excl` marker file.
    pub fn with_strategy(
        path: impl Into<PathBuf>,
        timeout: Option<Duration>,
        strategy: LockStrategy,
    ) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).map_err(|err| LockError::Io {
                path: path.clone(),
                err,
            })?;
        }

        let mut lock = Self {
            path,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            strategy,
            file: None,
            locked: false,
        };

        if strategy != LockStrategy::AtomicCreate {
            let file = open_lock_file(&lock.path).map_err(|err| LockError::Io {
                path: lock.path.clone(),
                err,
            })?;
            if probe_os_lock(&file) {
                lock.file = Some(file);
            } else {
                warn!(
                    "File locking is not supported at `{}`, falling back to exclusive file creation",
                    lock.path.user_display()
                );
                let mut marker = OsString::from(lock.path.as_os_str());
                marker.push(".excl");
                lock.path = PathBuf::from(marker);
                lock.strategy = LockStrategy::AtomicCreate;
            }
        }

        trace!(
            "Created {} lock at `{}`",
            lock.strategy,
            lock.path.user_display()
        );
        Ok(lock)
    }

    /// Set the interval between two attempts at taking a busy lock.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The strategy in use.
    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// The configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this instance currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Block until the lock is held by this instance or the timeout elapses.
    pub fn acquire(&mut self) -> Result<(), LockError> {
        if self.locked {
            return Err(LockError::Reentrant(self.path.clone()));
        }

        let start = Instant::now();
        let mut first_attempt = true;
        loop {
            self.try_acquire()?;
            if self.locked {
                debug!("Acquired lock at `{}`", self.path.user_display());
                return Ok(());
            }

            if first_attempt {
                info!(
                    "waiting on lock `{}` ({})",
                    self.path.user_display(),
                    self.strategy
                );
                first_attempt = false;
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() > timeout {
                    return Err(LockError::Timeout {
                        path: self.path.clone(),
                        timeout,
                    });
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }

    /// Make a single, non-blocking attempt at taking the lock.
    ///
    /// Returns `true` if the lock is held afterwards.
    pub fn try_acquire(&mut self) -> Result<bool, LockError> {
        if self.locked {
            return Ok(true);
        }

        match self.strategy {
            LockStrategy::Advisory | LockStrategy::Mandatory => {
                let Some(file) = self.file.as_ref() else {
                    return Err(LockError::Unsupported(self.path.clone()));
                };
                match file.file().try_lock() {
                    Ok(()) => self.locked = true,
                    Err(TryLockError::WouldBlock) => {}
                    Err(TryLockError::Error(err)) if is_unsupported_lock_error(&err) => {
                        return Err(LockError::Unsupported(self.path.clone()));
                    }
                    Err(TryLockError::Error(err)) if is_known_already_locked_error(&err) => {}
                    Err(TryLockError::Error(err)) => {
                        return Err(LockError::Io {
                            path: self.path.clone(),
                            err,
                        });
                    }
                }
            }
            LockStrategy::AtomicCreate => {
                match fs_err::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&self.path)
                {
                    Ok(file) => {
                        self.file = Some(file);
                        self.locked = true;
                    }
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                    // Windows reports a pending delete of the marker as a permission error.
                    Err(err) if cfg!(windows) && err.kind() == io::ErrorKind::PermissionDenied => {}
                    Err(err) => {
                        return Err(LockError::Io {
                            path: self.path.clone(),
                            err,
                        });
                    }
                }
            }
        }

        Ok(self.locked)
    }

    /// Release the lock, if held. Releasing an unlocked lock is a no-op.
    pub fn release(&mut self) {
        if !self.locked {
            return;
        }

        match self.strategy {
            LockStrategy::Advisory | LockStrategy::Mandatory => {
                // The lock file is never removed: a process could otherwise open the file right
                // before it is unlinked and then believe it holds a lock on a dangling inode.
                if let Some(file) = self.file.as_ref() {
                    if let Err(err) = file.file().unlock() {
                        error!(
                            "Failed to unlock `{}`; other processes may be stuck: {err}",
                            self.path.user_display()
                        );
                    }
                }
            }
            LockStrategy::AtomicCreate => {
                self.file = None;
                match fs_err::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => error!(
                        "Failed to remove lock marker; other processes may be stuck: {err}"
                    ),
                }
            }
        }

        self.locked = false;
        debug!("Released lock at `{}`", self.path.user_display());
    }

    /// Acquire the lock for the lifetime of the returned guard.
    pub fn lock(&mut self) -> Result<FileLockGuard<'_>, LockError> {
        self.acquire()?;
        Ok(FileLockGuard { lock: self })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Holds a [`FileLock`] until dropped.
#[derive(Debug)]
#[must_use]
pub struct FileLockGuard<'lock> {
    lock: &'lock mut FileLock,
}

impl FileLockGuard<'_> {
    /// The path of the held lock file.
    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Open (or create) the lock file shared by all processes.
#[cfg(unix)]
fn open_lock_file(path: &Path) -> io::Result<fs_err::File> {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(file) = fs_err::OpenOptions::new().read(true).write(true).open(path) {
        return Ok(file);
    }

    // Create the file under a temporary name with 666 permissions, then move it into place.
    // Permissions must be set after creation to override the `umask`.
    let file = if let Some(parent) = path.parent() {
        tempfile::NamedTempFile::new_in(parent)?
    } else {
        tempfile::NamedTempFile::new()?
    };
    if let Err(err) = file
        .as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o666))
    {
        warn!("Failed to set permissions on temporary file: {err}");
    }

    match file.persist_noclobber(path) {
        Ok(file) => Ok(fs_err::File::from_parts(file, path)),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path),
        Err(err) => Err(err.error),
    }
}

/// Open (or create) the lock file shared by all processes.
#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> io::Result<fs_err::File> {
    fs_err::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Returns `false` if the filesystem does not support OS file locks on `file`.
fn probe_os_lock(file: &fs_err::File) -> bool {
    match file.file().try_lock() {
        Ok(()) => {
            if let Err(err) = file.file().unlock() {
                warn!("Failed to release probe lock: {err}");
            }
            true
        }
        Err(TryLockError::WouldBlock) => true,
        Err(TryLockError::Error(err)) => !is_unsupported_lock_error(&err),
    }
}

/// Whether the error means that the filesystem can't lock files at all.
fn is_unsupported_lock_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    // `ENOLCK`, e.g. from NFS mounts without a lock manager.
    #[cfg(unix)]
    {
        rustix::io::Errno::from_io_error(err) == Some(rustix::io::Errno::NOLCK)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Whether the error is one some platforms return for a lock held elsewhere, rather than
/// [`TryLockError::WouldBlock`].
fn is_known_already_locked_error(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock => true,
        // Only Windows reports a held lock as a permission error; elsewhere it's a real one.
        io::ErrorKind::PermissionDenied => cfg!(windows),
        // `ERROR_LOCK_VIOLATION`
        _ => cfg!(windows) && err.raw_os_error() == Some(33),
    }
}
