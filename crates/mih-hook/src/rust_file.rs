use std::ffi::OsStr;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info};

use mih_build::{BuildBackend, BuildGuard, SettingsProvider, has_warnings, log_build_warnings};
use mih_cache::{BuildCache, BuildStatus};
use mih_freshness::{Freshness, FreshnessOracle, SourceTree};
use mih_fs::Simplified;
use mih_python::{Interpreter, ModuleSpec};

use crate::{Finder, HookSettings, ImportError, LoadedModules};

/// Imports `<name>.rs` files found on the search path as extension modules, building each in
/// a generated project inside the build cache.
pub struct RustFileFinder {
    interpreter: Arc<Interpreter>,
    backend: Arc<dyn BuildBackend>,
    settings: Arc<dyn SettingsProvider>,
    build_cache: Mutex<BuildCache>,
    oracle: FreshnessOracle,
}

impl Debug for RustFileFinder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustFileFinder")
            .field("interpreter", &self.interpreter.executable())
            .field("oracle", &self.oracle)
            .finish_non_exhaustive()
    }
}

impl RustFileFinder {
    pub fn new(
        settings: &HookSettings,
        interpreter: Arc<Interpreter>,
        backend: Arc<dyn BuildBackend>,
    ) -> Result<Self, ImportError> {
        Ok(Self {
            interpreter,
            backend,
            settings: Arc::new(settings.settings.clone()),
            build_cache: Mutex::new(BuildCache::new(&settings.build_dir, settings.lock_timeout)?),
            oracle: FreshnessOracle::new(
                settings.force_rebuild,
                settings.excluded_dir_names.clone(),
                settings.show_warnings,
            ),
        })
    }

    /// Choose the build settings per source file.
    #[must_use]
    pub fn with_settings_provider(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// Bring the extension module built from `file_path` up to date.
    ///
    /// Returns its spec and whether it was rebuilt.
    fn import_rust_file(
        &self,
        module_path: &str,
        module_name: &str,
        file_path: &Path,
    ) -> Result<(ModuleSpec, bool), ImportError> {
        debug!(
            "Importing Rust file `{}` as `{module_path}`",
            file_path.user_display()
        );

        let mut cache = self
            .build_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let build_cache = cache.lock()?;

        let output_dir = build_cache.scratch_dir(file_path, module_name);
        debug!("Output directory: `{}`", output_dir.user_display());
        let settings = self.settings.get_settings(module_path, file_path);
        let build_args = settings.to_args();
        let dist_dir = output_dir.join("dist");
        let package_dir = dist_dir.join(module_name);
        let suffixes = self.interpreter.extension_suffixes();

        let extension = mih_python::find_extension_module(&package_dir, module_name, suffixes);
        let status = build_cache.get_build_status(file_path);
        match self.oracle.check(
            module_path,
            &SourceTree::File(file_path),
            extension.as_deref(),
            status.as_ref(),
            &build_args,
        ) {
            Freshness::Fresh { .. } => {
                if let Some(extension) = extension {
                    debug!(
                        "Module up to date: `{module_path}` (`{}`)",
                        extension.user_display()
                    );
                    return Ok((ModuleSpec::extension(module_path, extension), false));
                }
            }
            Freshness::Stale(reason) => {
                debug!("Module `{module_path}` will be rebuilt because: {reason}");
            }
        }

        info!("building `{module_path}`");
        debug!(
            "Creating project for `{}` and compiling",
            file_path.user_display()
        );
        let start = Instant::now();
        let project_dir = output_dir.join(
            file_path
                .file_stem()
                .unwrap_or_else(|| OsStr::new(module_name)),
        );
        let output = {
            let _guard = BuildGuard::enter();
            let build_failed = |err: mih_build::Error| ImportError::BuildFailed {
                module: module_path.to_string(),
                err,
            };
            let manifest_path = mih_build::generate_project_for_single_rust_file(
                self.backend.as_ref(),
                &project_dir,
                file_path,
                &settings,
            )
            .map_err(build_failed)?;
            if !manifest_path.is_file() {
                return Err(ImportError::ManifestNotFound(file_path.to_path_buf()));
            }
            mih_build::build_unpacked_wheel(
                self.backend.as_ref(),
                &manifest_path,
                self.interpreter.executable(),
                &dist_dir,
                &settings,
            )
            .map_err(build_failed)?
        };
        debug!(
            "Compiled `{}` in {:.3}s",
            file_path.user_display(),
            start.elapsed().as_secs_f64()
        );

        if has_warnings(&output) {
            log_build_warnings(module_path, &output, true, self.oracle.show_warnings());
        }

        let extension = mih_python::find_extension_module(&package_dir, module_name, suffixes)
            .ok_or_else(|| ImportError::LoadAfterBuild {
                module: module_path.to_string(),
                dir: package_dir.clone(),
            })?;
        build_cache.store_build_status(&BuildStatus {
            build_mtime: mih_fs::mtime(&extension)?,
            source_path: file_path.to_path_buf(),
            build_args,
            build_output: output,
        })?;

        Ok((ModuleSpec::extension(module_path, extension), true))
    }
}

impl Finder for RustFileFinder {
    fn find_spec(
        &self,
        fullname: &str,
        path: Option<&[PathBuf]>,
        modules: &LoadedModules,
    ) -> Result<Option<ModuleSpec>, ImportError> {
        if modules.contains(fullname) || BuildGuard::is_active() {
            return Ok(None);
        }

        let start = Instant::now();
        debug!("RustFileFinder searching for `{fullname}`");

        let search_path = match path {
            Some(path) => path.to_vec(),
            None => self.interpreter.search_path().entries(),
        };
        let module_name = fullname.rsplit('.').next().unwrap_or(fullname);

        for entry in search_path {
            let rust_file = entry.join(format!("{module_name}.rs"));
            if !rust_file.is_file() {
                continue;
            }
            let (spec, rebuilt) = self.import_rust_file(fullname, module_name, &rust_file)?;
            let elapsed = start.elapsed().as_secs_f64();
            if rebuilt {
                info!("rebuilt and loaded module `{fullname}` in {elapsed:.3}s");
            } else {
                debug!("Loaded module `{fullname}` in {elapsed:.3}s");
            }
            return Ok(Some(spec));
        }
        Ok(None)
    }
}
