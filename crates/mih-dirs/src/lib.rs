use std::ffi::OsString;
use std::path::PathBuf;

use etcetera::BaseStrategy;

use mih_static::EnvVars;

/// Returns the platform's user-level cache directory.
///
/// This is:
///
/// - `~/Library/Caches` on macOS
/// - `%LOCALAPPDATA%` on Windows
/// - `$XDG_CACHE_HOME`, or `~/.cache` if unset or relative, elsewhere
///
/// Returns `None` if the home directory cannot be resolved. Does not check if the directory
/// exists.
pub fn user_cache_dir() -> Option<PathBuf> {
    if cfg!(not(any(windows, target_os = "macos"))) {
        if let Some(path) = std::env::var_os(EnvVars::XDG_CACHE_HOME).and_then(parse_path) {
            return Some(path);
        }
    }
    etcetera::base_strategy::choose_native_strategy()
        .ok()
        .map(|dirs| dirs.cache_dir())
}

/// Returns the directory holding build caches shared by all interpreters of the current user.
///
/// Corresponds to `$XDG_CACHE_HOME/maturin_build_cache` on Linux.
pub fn user_build_cache_dir() -> Option<PathBuf> {
    user_cache_dir().map(|dir| dir.join("maturin_build_cache"))
}

/// Return a [`PathBuf`] if the given [`OsString`] is an absolute path.
fn parse_path(path: OsString) -> Option<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() { Some(path) } else { None }
}
