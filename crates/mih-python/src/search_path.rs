use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, trace};

use mih_fs::Simplified;

/// The interpreter's module search path (`sys.path`) and its `site-packages` directories.
///
/// Entries can be appended at runtime when newly installed packages add `.pth` files, so the
/// path is shared behind a lock.
#[derive(Debug, Default)]
pub struct SearchPath {
    entries: RwLock<Vec<PathBuf>>,
    site_packages: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(entries: Vec<PathBuf>, site_packages: Vec<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(entries),
            site_packages,
        }
    }

    /// A snapshot of the current search path entries, in order.
    pub fn entries(&self) -> Vec<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The `site-packages` directories of the interpreter.
    pub fn site_packages(&self) -> &[PathBuf] {
        &self.site_packages
    }

    /// Re-read the `.pth` files of every `site-packages` directory, appending any directory
    /// they name that exists and is not yet on the search path.
    ///
    /// Returns the number of entries added.
    pub fn refresh_site_packages(&self) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        for site_packages in &self.site_packages {
            if !entries.contains(site_packages) && site_packages.is_dir() {
                entries.push(site_packages.clone());
            }
            for pth in pth_files(site_packages) {
                for dir in read_pth(site_packages, &pth) {
                    if !entries.contains(&dir) {
                        trace!(
                            "Adding `{}` from `{}`",
                            dir.user_display(),
                            pth.user_display()
                        );
                        entries.push(dir);
                    }
                }
            }
        }
        let added = entries.len() - before;
        debug!("Refreshed site packages, found {added} new search path entries");
        added
    }
}

/// The `.pth` files of a `site-packages` directory, sorted by name; hidden files are skipped.
fn pth_files(site_packages: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = mih_fs::entries(site_packages)
        .filter(|path| path.extension().is_some_and(|ext| ext == "pth"))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !name.starts_with('.'))
        })
        .collect();
    files.sort();
    files
}

/// The existing directories named by a `.pth` file, relative to its `site-packages`.
///
/// Comments, blank lines and `import` lines are skipped.
fn read_pth(site_packages: &Path, pth: &Path) -> Vec<PathBuf> {
    let contents = match fs_err::read_to_string(pth) {
        Ok(contents) => contents,
        Err(err) => {
            debug!("Skipping unreadable `.pth` file: {err}");
            return Vec::new();
        }
    };
    contents
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| !line.starts_with("import ") && !line.starts_with("import\t"))
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| site_packages.join(line))
        .filter(|dir| dir.exists())
        .collect()
}
