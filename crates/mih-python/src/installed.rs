use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use mih_fs::Simplified;

/// The `direct_url.json` file of an installed distribution (PEP 610), reduced to the fields
/// relevant to local directory installs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectUrl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub dir_info: DirInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirInfo {
    #[serde(default)]
    pub editable: bool,
}

impl DirectUrl {
    /// The record of an editable install of the project at `path`.
    pub fn editable_local(path: &Path) -> io::Result<Self> {
        let path = std::path::absolute(path)?;
        let url = Url::from_file_path(&path).map_err(|()| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cannot express `{}` as a file URL", path.user_display()),
            )
        })?;
        Ok(Self {
            url: Some(url.to_string()),
            dir_info: DirInfo { editable: true },
        })
    }

    /// The local path the distribution was installed from, if it was installed from a
    /// `file://` URL.
    pub fn file_path(&self) -> Option<PathBuf> {
        let url = Url::parse(self.url.as_deref()?).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()
    }

    pub fn is_editable(&self) -> bool {
        self.dir_info.editable
    }
}

/// Find the `.dist-info` directory of `package_name` directly inside `dir`.
///
/// If there are several (e.g. left over from an interrupted upgrade), the first by name wins.
pub fn find_dist_info(dir: &Path, package_name: &str) -> Option<PathBuf> {
    let prefix = format!("{package_name}-");
    let mut candidates: Vec<PathBuf> = mih_fs::entries(dir)
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".dist-info"))
        })
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Read the `direct_url.json` file from a `.dist-info` directory.
///
/// Returns `None` if the file is missing, unreadable or malformed.
pub fn read_direct_url(dist_info: &Path) -> Option<DirectUrl> {
    let path = dist_info.join("direct_url.json");
    let contents = match fs_err::read(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            debug!("Failed to read direct URL: {err}");
            return None;
        }
    };
    match serde_json::from_slice(&contents) {
        Ok(direct_url) => Some(direct_url),
        Err(err) => {
            debug!(
                "Ignoring malformed direct URL at `{}`: {err}",
                path.user_display()
            );
            None
        }
    }
}

/// Point the `direct_url.json` of every installed `package_name` at `project_dir`, marking it
/// as editable.
///
/// Building with `maturin develop` doesn't always record the project directory, which is what
/// allows the import hook to find the project again from the installed package. Returns the
/// number of records rewritten.
pub fn fix_direct_url(site_packages: &[PathBuf], project_dir: &Path, package_name: &str) -> usize {
    debug!("Fixing direct URL for `{package_name}`");
    let expected = match DirectUrl::editable_local(project_dir) {
        Ok(expected) => expected,
        Err(err) => {
            debug!("{err}");
            return 0;
        }
    };

    let mut fixed = 0;
    for dir in site_packages {
        let Some(dist_info) = find_dist_info(dir, package_name) else {
            continue;
        };
        let Some(direct_url) = read_direct_url(&dist_info) else {
            continue;
        };
        if direct_url.url == expected.url {
            continue;
        }
        debug!(
            "Rewriting direct URL of `{package_name}`: {} -> {}",
            direct_url.url.as_deref().unwrap_or("<none>"),
            expected.url.as_deref().unwrap_or("<none>")
        );
        let result = serde_json::to_string(&expected)
            .map_err(io::Error::from)
            .and_then(|data| mih_fs::write_atomic_sync(dist_info.join("direct_url.json"), data));
        match result {
            Ok(()) => fixed += 1,
            Err(err) => {
                debug!("Failed to write direct URL: {err}");
                return fixed;
            }
        }
    }
    fixed
}

/// Whether `package_name` appears to be installed in one of the `site-packages` directories,
/// either as a package directory or through a `.pth` file.
pub fn is_installed_package(site_packages: &[PathBuf], package_name: &str) -> bool {
    site_packages.iter().any(|dir| {
        dir.join(package_name).is_dir() || dir.join(format!("{package_name}.pth")).is_file()
    })
}

/// Whether `package_name` is installed in editable mode from `project_dir`.
///
/// A package counts as editable-installed if a `.pth` file points into the project, or if its
/// package directory has an editable `.dist-info` linking back to the project. The first
/// `site-packages` directory containing the package directory decides.
pub fn is_editable_installed_package(
    site_packages: &[PathBuf],
    project_dir: &Path,
    package_name: &str,
) -> bool {
    for dir in site_packages {
        let pth = dir.join(format!("{package_name}.pth"));
        if pth.is_file() {
            if let Ok(contents) = fs_err::read_to_string(&pth) {
                let link = Path::new(contents.trim());
                if link.starts_with(project_dir) {
                    return true;
                }
            }
        }

        if dir.join(package_name).is_dir() {
            return find_dist_info(dir, package_name)
                .and_then(|dist_info| read_direct_url(&dist_info))
                .is_some_and(|direct_url| {
                    direct_url.is_editable()
                        && direct_url.file_path().as_deref() == Some(project_dir)
                });
        }
    }
    false
}
