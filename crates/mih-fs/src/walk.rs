use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rustc_hash::FxHashSet;
use walkdir::WalkDir;

/// The modification time of a file as (possibly fractional) seconds since the Unix epoch.
///
/// Follows symlinks.
pub fn mtime(path: &Path) -> io::Result<f64> {
    let modified = fs_err::metadata(path)?.modified()?;
    Ok(system_time_to_seconds(modified))
}

/// Convert a [`SystemTime`] to seconds since the Unix epoch; times before the epoch are
/// negative.
pub fn system_time_to_seconds(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs_f64(),
        Err(err) => -err.duration().as_secs_f64(),
    }
}

/// Directories skipped while walking a tree: any directory whose name is in `names`, or whose
/// path is in `paths`.
#[derive(Debug, Clone, Copy)]
pub struct Exclusions<'a> {
    pub names: &'a FxHashSet<String>,
    pub paths: &'a [PathBuf],
}

impl Exclusions<'_> {
    fn excludes(&self, entry: &walkdir::DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.names.contains(name))
        {
            return true;
        }
        self.paths.iter().any(|path| path == entry.path())
    }
}

/// Iterate over every non-directory entry below `root`, recursing into directories unless
/// they are excluded. The name of `root` itself is never checked against the exclusions.
///
/// Symlinks are followed, so a link to a directory is walked like the directory itself.
/// Errors (a missing `root`, unreadable directories, symlink loops) are yielded to the
/// caller.
pub fn files_excluding<'a>(
    root: &Path,
    exclusions: Exclusions<'a>,
) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(move |entry| !exclusions.excludes(entry))
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => None,
            Ok(entry) => Some(Ok(entry.into_path())),
            Err(err) => Some(Err(err)),
        })
}
