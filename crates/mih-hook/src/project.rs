use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, enabled, error, info, Level};

use mih_build::{BuildBackend, BuildGuard, SettingsProvider, has_warnings, log_build_warnings};
use mih_cache::{BuildCache, BuildStatus};
use mih_freshness::{Freshness, FreshnessOracle, SourceTree};
use mih_fs::Simplified;
use mih_project::{ProjectResolver, ResolvedProject, find_maybe_maturin_project_above};
use mih_python::{Interpreter, ModuleSpec};

use crate::{Finder, HookSettings, ImportError, LoadedModules};

/// Rebuilds maturin projects installed in editable mode (or, optionally, not installed at all)
/// when they are imported and their sources changed.
///
/// Only top-level packages are handled. A project is found either through the
/// `direct_url.json` of an installed distribution, or as a directory on (or above) the search
/// path.
pub struct ProjectFinder {
    interpreter: Arc<Interpreter>,
    backend: Arc<dyn BuildBackend>,
    settings: Arc<dyn SettingsProvider>,
    build_cache: Mutex<BuildCache>,
    resolver: ProjectResolver,
    oracle: FreshnessOracle,
    install_new_packages: bool,
}

impl Debug for ProjectFinder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectFinder")
            .field("interpreter", &self.interpreter.executable())
            .field("oracle", &self.oracle)
            .field("install_new_packages", &self.install_new_packages)
            .finish_non_exhaustive()
    }
}

impl ProjectFinder {
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
            resolver: ProjectResolver::default(),
            oracle: FreshnessOracle::new(
                settings.force_rebuild,
                settings.excluded_dir_names.clone(),
                settings.show_warnings,
            ),
            install_new_packages: settings.install_new_packages,
        })
    }

    /// Choose the build settings per project.
    #[must_use]
    pub fn with_settings_provider(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// Bring the project at `project_dir` up to date if it provides `package_name`.
    ///
    /// Returns the spec of the package and whether it was rebuilt, or `None` if the project
    /// can't be imported as `package_name`.
    fn rebuild_project(
        &self,
        package_name: &str,
        project_dir: &Path,
    ) -> Result<Option<(ModuleSpec, bool)>, ImportError> {
        let Some(resolved) = self.resolver.resolve(project_dir) else {
            return Ok(None);
        };
        debug!(
            "Resolved package `{}`, module `{}`",
            resolved.package_name(),
            resolved.module_full_name()
        );
        if package_name != resolved.package_name() {
            debug!(
                "Package name `{}` of project does not match `{package_name}`; not importing",
                resolved.package_name()
            );
            return Ok(None);
        }

        let site_packages = self.interpreter.search_path().site_packages();
        if !self.install_new_packages
            && !mih_python::is_editable_installed_package(site_packages, project_dir, package_name)
        {
            debug!(
                "Package `{package_name}` is not installed in editable mode and installing new packages is disabled; not importing"
            );
            return Ok(None);
        }

        debug!(
            "Importing project `{}` as `{package_name}`",
            project_dir.user_display()
        );

        let mut cache = self
            .build_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let build_cache = cache.lock()?;

        let settings = self.settings.get_settings(package_name, project_dir);
        let build_args = settings.to_args();

        let spec = self.find_package_spec(package_name);
        let installed_root = spec
            .as_ref()
            .and_then(|spec| self.installed_package_root(&resolved, spec));
        let source = SourceTree::Project {
            root: project_dir,
            path_dependencies: resolved.all_path_dependencies(),
        };
        let status = build_cache.get_build_status(project_dir);
        match self.oracle.check(
            package_name,
            &source,
            installed_root.as_deref(),
            status.as_ref(),
            &build_args,
        ) {
            Freshness::Fresh { .. } => {
                if let Some(spec) = spec {
                    debug!("Package up to date: `{package_name}`");
                    return Ok(Some((spec, false)));
                }
            }
            Freshness::Stale(reason) => {
                debug!("Package `{package_name}` will be rebuilt because: {reason}");
            }
        }

        info!("building `{package_name}`");
        let start = Instant::now();
        let output = {
            let _guard = BuildGuard::enter();
            self.backend
                .develop(resolved.manifest_path(), &settings)
                .map_err(|err| ImportError::BuildFailed {
                    module: package_name.to_string(),
                    err,
                })?
        };
        mih_python::fix_direct_url(site_packages, project_dir, package_name);
        debug!(
            "Compiled project `{package_name}` in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        if has_warnings(&output) {
            log_build_warnings(package_name, &output, true, self.oracle.show_warnings());
        }

        let spec = self
            .find_package_spec(package_name)
            .ok_or_else(|| ImportError::NotFoundAfterBuild(package_name.to_string()))?;

        match self.installed_package_root(&resolved, &spec) {
            None => error!("could not get installed package root"),
            Some(installed_root) => match self.oracle.installed_mtime(&installed_root) {
                None => error!("could not get installed package mtime"),
                Some(build_mtime) => {
                    build_cache.store_build_status(&BuildStatus {
                        build_mtime,
                        source_path: project_dir.to_path_buf(),
                        build_args,
                        build_output: output,
                    })?;
                }
            },
        }

        Ok(Some((spec, true)))
    }

    /// Find `package_name` on the search path, re-reading `.pth` files if the package appears
    /// to be installed but can't be found (e.g. right after an editable install).
    fn find_package_spec(&self, package_name: &str) -> Option<ModuleSpec> {
        let search_path = self.interpreter.search_path();
        let suffixes = self.interpreter.extension_suffixes();
        if let Some(spec) = mih_python::find_spec(package_name, &search_path.entries(), suffixes) {
            return Some(spec);
        }
        debug!("Spec for package `{package_name}` not found");
        if mih_python::is_installed_package(search_path.site_packages(), package_name) {
            debug!(
                "Package `{package_name}` appears to be installed; refreshing packages and trying again"
            );
            search_path.refresh_site_packages();
            return mih_python::find_spec(package_name, &search_path.entries(), suffixes);
        }
        None
    }

    /// The files that change every time the project is rebuilt: for a mixed project, the
    /// extension module inside the source tree (a file, or a package directory); for a pure
    /// project, the directory of the installed package.
    fn installed_package_root(
        &self,
        resolved: &ResolvedProject,
        spec: &ModuleSpec,
    ) -> Option<PathBuf> {
        if let Some(extension_module_dir) = resolved.extension_module_dir() {
            let package = extension_module_dir.join(resolved.module_name());
            if package.join("__init__.py").exists() {
                return Some(package);
            }
            let extension = mih_python::find_extension_module(
                extension_module_dir,
                resolved.module_name(),
                self.interpreter.extension_suffixes(),
            );
            if extension.is_none() {
                debug!(
                    "No extension module found in `{}`",
                    extension_module_dir.user_display()
                );
            }
            extension
        } else if let Some(origin) = &spec.origin {
            origin.parent().map(Path::to_path_buf)
        } else {
            debug!("Could not find installation location for pure package");
            None
        }
    }
}

impl Finder for ProjectFinder {
    fn find_spec(
        &self,
        fullname: &str,
        path: Option<&[PathBuf]>,
        modules: &LoadedModules,
    ) -> Result<Option<ModuleSpec>, ImportError> {
        if modules.contains(fullname) || BuildGuard::is_active() {
            return Ok(None);
        }
        if path.is_some() || fullname.contains('.') {
            return Ok(None);
        }
        let package_name = fullname;

        let start = Instant::now();
        debug!("ProjectFinder searching for `{package_name}`");

        for entry in self.interpreter.search_path().entries() {
            let mut found = None;
            if let Some((project_dir, is_editable)) = load_dist_info(&entry, package_name) {
                debug!(
                    "Found project linked by dist-info: `{}`",
                    project_dir.user_display()
                );
                if !is_editable && !self.install_new_packages {
                    debug!(
                        "Package not installed in editable mode and installing new packages is disabled; not rebuilding"
                    );
                } else {
                    found = self.rebuild_project(package_name, &project_dir)?;
                }
            }

            if found.is_none() {
                if let Some(project_dir) = find_maybe_maturin_project_above(&entry) {
                    debug!(
                        "Found project above the search path: `{}` (`{}`)",
                        project_dir.user_display(),
                        entry.user_display()
                    );
                    found = self.rebuild_project(package_name, &project_dir)?;
                }
            }

            if let Some((spec, rebuilt)) = found {
                let elapsed = start.elapsed().as_secs_f64();
                if rebuilt {
                    info!("rebuilt and loaded package `{package_name}` in {elapsed:.3}s");
                } else if enabled!(Level::DEBUG) {
                    debug!("Loaded package `{package_name}` in {elapsed:.3}s");
                }
                return Ok(Some(spec));
            }
        }
        Ok(None)
    }
}

/// The project an installed distribution of `package_name` in `dir` was installed from, and
/// whether it was installed in editable mode.
///
/// Only projects installed from a local directory that still looks like a maturin project are
/// returned.
fn load_dist_info(dir: &Path, package_name: &str) -> Option<(PathBuf, bool)> {
    let dist_info = mih_python::find_dist_info(dir, package_name)?;
    let direct_url = mih_python::read_direct_url(&dist_info)?;
    let project_dir = direct_url.file_path()?;
    if mih_project::is_maybe_maturin_project(&project_dir) {
        Some((project_dir, direct_url.is_editable()))
    } else {
        None
    }
}
