use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use zip::ZipArchive;

use crate::Error;

/// Unzip a wheel into the target directory.
pub fn unpack_wheel(wheel: &Path, target: &Path) -> Result<(), Error> {
    debug!("Unpacking `{}` into `{}`", wheel.display(), target.display());
    let mut archive = ZipArchive::new(fs_err::File::open(wheel)?)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;

        // Skip entries that would escape the target directory.
        let Some(relative) = file.enclosed_name() else {
            trace!("Skipping unsafe archive entry `{}`", file.name());
            continue;
        };

        let path = target.join(relative);
        if file.is_dir() {
            fs_err::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut outfile = fs_err::File::create(&path)?;
        std::io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = file.unix_mode() {
                fs_err::set_permissions(&path, Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

/// Find the only wheel in `dir`.
///
/// Returns [`Error::MissingWheel`] if there are no wheels or more than one.
pub fn find_single_wheel(dir: &Path) -> Result<PathBuf, Error> {
    let mut wheels = mih_fs::entries(dir).filter(|path| {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("whl"))
    });
    match (wheels.next(), wheels.next()) {
        (Some(wheel), None) => Ok(wheel),
        _ => Err(Error::MissingWheel(dir.to_path_buf())),
    }
}
