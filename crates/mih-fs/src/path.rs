use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// The current working directory, captured once for user-facing path rendering.
pub static CWD: LazyLock<PathBuf> =
    LazyLock::new(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub trait Simplified {
    /// Simplify a [`Path`].
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's a no-op.
    fn simplified(&self) -> &Path;

    /// Render a [`Path`] for display, stripping the `\\?\` prefix on Windows.
    fn simplified_display(&self) -> std::path::Display<'_>;

    /// Render a [`Path`] for user-facing display.
    ///
    /// Paths below the current working directory are shown relative to it.
    fn user_display(&self) -> std::path::Display<'_>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn simplified(&self) -> &Path {
        dunce::simplified(self.as_ref())
    }

    fn simplified_display(&self) -> std::path::Display<'_> {
        dunce::simplified(self.as_ref()).display()
    }

    fn user_display(&self) -> std::path::Display<'_> {
        let path = dunce::simplified(self.as_ref());

        // Avoid rendering the working directory itself as an empty string.
        if CWD.simplified() == path {
            return path.display();
        }

        path.strip_prefix(CWD.simplified())
            .unwrap_or(path)
            .display()
    }
}

/// Return the bytes of a path, for use in hashing.
///
/// The encoding is platform-specific but stable for a given platform, which is all a cache key
/// needs.
pub fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    Cow::Borrowed(path.as_os_str().as_encoded_bytes())
}

/// Returns `true` if the current process may write to `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    rustix::fs::access(path, rustix::fs::Access::WRITE_OK).is_ok()
}

/// Returns `true` if the current process may write to `path`.
#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    fs_err::metadata(path).is_ok_and(|metadata| !metadata.permissions().readonly())
}
