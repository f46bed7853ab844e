use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace};

use mih_fs::Simplified;

use crate::manifest::{CargoToml, PyProjectToml};

mod manifest;

#[derive(Debug, thiserror::Error)]
pub enum ProjectResolveError {
    #[error("No `pyproject.toml` found in `{}`", _0.user_display())]
    MissingPyproject(PathBuf),
    #[error("No `Cargo.toml` found for the project at `{}`", _0.user_display())]
    MissingManifest(PathBuf),
    #[error("Failed to parse `{}`", _0.user_display())]
    Toml(PathBuf, #[source] Box<toml::de::Error>),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Could not resolve the module name of the project at `{}`", _0.user_display())]
    UnresolvedModuleName(PathBuf),
}

/// The layout of a maturin project, as far as the import hook is concerned.
///
/// Mirrors how `maturin` itself decides where the extension module of an editable install is
/// written.
#[derive(Debug)]
pub struct ResolvedProject {
    project_dir: PathBuf,
    manifest_path: PathBuf,
    module_full_name: String,
    python_dir: PathBuf,
    python_module: Option<PathBuf>,
    extension_module_dir: Option<PathBuf>,
    immediate_path_dependencies: Vec<PathBuf>,
    all_path_dependencies: OnceLock<Vec<PathBuf>>,
}

impl ResolvedProject {
    /// The directory containing the `pyproject.toml`.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The `Cargo.toml` of the crate that is built.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// The dotted name of the extension module, without any file suffix (e.g.
    /// `my_project.my_ext` rather than `my_project/my_ext.cpython-312-x86_64-linux-gnu.so`).
    pub fn module_full_name(&self) -> &str {
        &self.module_full_name
    }

    /// The root of the Python sources (the project directory if there is no separate root).
    pub fn python_dir(&self) -> &Path {
        &self.python_dir
    }

    /// The top-level Python package, for mixed Rust/Python projects.
    pub fn python_module(&self) -> Option<&Path> {
        self.python_module.as_deref()
    }

    /// Where an editable install writes the extension module, for mixed Rust/Python projects.
    pub fn extension_module_dir(&self) -> Option<&Path> {
        self.extension_module_dir.as_deref()
    }

    /// The `path` dependencies declared by the project's own `Cargo.toml`.
    pub fn immediate_path_dependencies(&self) -> &[PathBuf] {
        &self.immediate_path_dependencies
    }

    /// All `path` dependencies, including transitive ones, sorted.
    ///
    /// Computed on first access.
    pub fn all_path_dependencies(&self) -> &[PathBuf] {
        self.all_path_dependencies
            .get_or_init(|| find_all_path_dependencies(&self.immediate_path_dependencies))
    }

    /// The first component of the module name, i.e. the name the package is imported as.
    pub fn package_name(&self) -> &str {
        self.module_full_name
            .split('.')
            .next()
            .unwrap_or(&self.module_full_name)
    }

    /// The last component of the module name.
    pub fn module_name(&self) -> &str {
        self.module_full_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.module_full_name)
    }

    /// Whether the project contains both Python and Rust code.
    pub fn is_mixed(&self) -> bool {
        self.extension_module_dir.is_some()
    }
}

/// Resolves project directories to [`ResolvedProject`]s, remembering every result (including
/// failures) for its own lifetime.
#[derive(Debug, Default)]
pub struct ProjectResolver {
    resolved: Mutex<FxHashMap<PathBuf, Option<Arc<ResolvedProject>>>>,
}

impl ProjectResolver {
    /// Resolve the project at `project_dir`, or `None` if it isn't a valid maturin project.
    pub fn resolve(&self, project_dir: &Path) -> Option<Arc<ResolvedProject>> {
        let mut resolved = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(project) = resolved.get(project_dir) {
            trace!("Using memoized project for `{}`", project_dir.user_display());
            return project.clone();
        }

        let project = match resolve_project(project_dir) {
            Ok(project) => Some(Arc::new(project)),
            Err(err) => {
                info!(
                    "failed to resolve project `{}`: {err}",
                    project_dir.user_display()
                );
                None
            }
        };
        resolved.insert(project_dir.to_path_buf(), project.clone());
        project
    }
}

/// Find the `Cargo.toml` of the project at `project_dir`.
///
/// In order of preference: `[tool.maturin] manifest-path` in the `pyproject.toml` (which is not
/// checked for existence), `Cargo.toml`, then `rust/Cargo.toml`.
pub fn find_cargo_manifest(project_dir: &Path) -> Option<PathBuf> {
    let pyproject = match read_toml::<PyProjectToml>(&project_dir.join("pyproject.toml")) {
        Ok(pyproject) => pyproject,
        Err(ProjectResolveError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            PyProjectToml::default()
        }
        Err(err) => {
            debug!("{err}");
            PyProjectToml::default()
        }
    };
    manifest_path_for(project_dir, &pyproject)
}

/// Whether `dir` looks like a maturin project: it has a `pyproject.toml` and a Cargo manifest.
///
/// The manifests are not validated.
pub fn is_maybe_maturin_project(dir: &Path) -> bool {
    dir.join("pyproject.toml").exists() && find_cargo_manifest(dir).is_some()
}

/// Return the first of `path` and its ancestors that looks like a maturin project.
pub fn find_maybe_maturin_project_above(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| is_maybe_maturin_project(dir))
        .map(Path::to_path_buf)
}

/// Resolve the layout of the maturin project at `project_dir`.
pub fn resolve_project(project_dir: &Path) -> Result<ResolvedProject, ProjectResolveError> {
    let pyproject_path = project_dir.join("pyproject.toml");
    let pyproject = match read_toml::<PyProjectToml>(&pyproject_path) {
        Ok(pyproject) => pyproject,
        Err(ProjectResolveError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ProjectResolveError::MissingPyproject(
                project_dir.to_path_buf(),
            ));
        }
        Err(err) => return Err(err),
    };

    let manifest_path = manifest_path_for(project_dir, &pyproject)
        .ok_or_else(|| ProjectResolveError::MissingManifest(project_dir.to_path_buf()))?;
    let cargo = match read_toml::<CargoToml>(&manifest_path) {
        Ok(cargo) => cargo,
        Err(ProjectResolveError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ProjectResolveError::MissingManifest(
                project_dir.to_path_buf(),
            ));
        }
        Err(err) => return Err(err),
    };

    let module_full_name = resolve_module_name(&pyproject, &cargo)
        .ok_or_else(|| ProjectResolveError::UnresolvedModuleName(project_dir.to_path_buf()))?;

    let python_dir = resolve_py_root(project_dir, &pyproject);
    let (python_module, extension_module_dir) =
        resolve_rust_module(&python_dir, &module_full_name);
    let (python_module, extension_module_dir) = if python_module.exists() {
        (Some(python_module), Some(extension_module_dir))
    } else {
        (None, None)
    };

    let manifest_dir = manifest_path.parent().unwrap_or(project_dir);
    let immediate_path_dependencies = cargo
        .path_dependencies(manifest_dir)
        .map(resolve_path)
        .collect();

    Ok(ResolvedProject {
        project_dir: project_dir.to_path_buf(),
        manifest_path,
        module_full_name,
        python_dir,
        python_module,
        extension_module_dir,
        immediate_path_dependencies,
        all_path_dependencies: OnceLock::new(),
    })
}

/// Follow `path` dependencies transitively, starting from `immediate_path_dependencies`.
///
/// Dependencies without a readable `Cargo.toml` are kept but not followed. Cycles are
/// tolerated. Returns the sorted set of dependency directories.
pub fn find_all_path_dependencies(immediate_path_dependencies: &[PathBuf]) -> Vec<PathBuf> {
    let mut all = FxHashSet::default();
    let mut to_search = immediate_path_dependencies.to_vec();
    while let Some(dependency) = to_search.pop() {
        if !all.insert(dependency.clone()) {
            continue;
        }
        let manifest_path = dependency.join("Cargo.toml");
        if !manifest_path.exists() {
            continue;
        }
        match read_toml::<CargoToml>(&manifest_path) {
            Ok(cargo) => {
                to_search.extend(cargo.path_dependencies(&dependency).map(resolve_path));
            }
            Err(err) => debug!(
                "Not following path dependencies of `{}`: {err}",
                dependency.user_display()
            ),
        }
    }
    let mut all: Vec<PathBuf> = all.into_iter().collect();
    all.sort();
    all
}

fn manifest_path_for(project_dir: &Path, pyproject: &PyProjectToml) -> Option<PathBuf> {
    if let Some(manifest_path) = pyproject
        .maturin()
        .and_then(|maturin| maturin.manifest_path.as_ref())
    {
        return Some(project_dir.join(manifest_path));
    }
    [
        project_dir.join("Cargo.toml"),
        project_dir.join("rust").join("Cargo.toml"),
    ]
    .into_iter()
    .find(|path| path.exists())
}

/// The module name, in order of preference: `[tool.maturin] module-name`, the `Cargo.toml`
/// `[lib] name`, `[project] name`, then the `Cargo.toml` `[package] name`.
fn resolve_module_name(pyproject: &PyProjectToml, cargo: &CargoToml) -> Option<String> {
    pyproject
        .maturin()
        .and_then(|maturin| maturin.module_name.clone())
        .or_else(|| cargo.lib.as_ref().and_then(|lib| lib.name.clone()))
        .or_else(|| {
            pyproject
                .project
                .as_ref()
                .and_then(|project| project.name.clone())
        })
        .or_else(|| {
            cargo
                .package
                .as_ref()
                .and_then(|package| package.name.clone())
        })
}

/// The root of the Python sources.
///
/// An explicit `python-source` wins. Otherwise the `src` directory is used for projects that
/// keep their crate in `rust/` and have a Python package under `src/` (or in one of the
/// `python-packages`).
fn resolve_py_root(project_dir: &Path, pyproject: &PyProjectToml) -> PathBuf {
    let maturin = pyproject.maturin();
    if let Some(python_source) = maturin.and_then(|maturin| maturin.python_source.as_ref()) {
        return project_dir.join(python_source);
    }
    let Some(project_name) = pyproject
        .project
        .as_ref()
        .and_then(|project| project.name.as_ref())
    else {
        return project_dir.to_path_buf();
    };

    let rust_cargo_toml_found = project_dir.join("rust").join("Cargo.toml").exists();

    let package_name = project_name.replace('-', "_");
    let python_packages = maturin
        .map(|maturin| maturin.python_packages.as_slice())
        .unwrap_or_default();
    let python_src_found = std::iter::once(Path::new("src").join(&package_name))
        .chain(python_packages.iter().map(PathBuf::from))
        .any(|package| project_dir.join(package).join("__init__.py").is_file());

    if rust_cargo_toml_found && python_src_found {
        project_dir.join("src")
    } else {
        project_dir.to_path_buf()
    }
}

/// The top-level Python package and the directory the extension module is written to.
///
/// For `a.b.c`, these are `a` and `a/b`; for an undotted `m`, both are `m`.
fn resolve_rust_module(python_dir: &Path, module_full_name: &str) -> (PathBuf, PathBuf) {
    let parts: Vec<&str> = module_full_name.split('.').collect();
    if let [first, parents @ .., _] = parts.as_slice() {
        let extension_module_dir = parents
            .iter()
            .fold(python_dir.join(first), |dir, part| dir.join(part));
        (python_dir.join(first), extension_module_dir)
    } else {
        (
            python_dir.join(module_full_name),
            python_dir.join(module_full_name),
        )
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ProjectResolveError> {
    let contents = fs_err::read_to_string(path)?;
    toml::from_str(&contents)
        .map_err(|err| ProjectResolveError::Toml(path.to_path_buf(), Box::new(err)))
}

/// Make `path` absolute, resolving symlinks if it exists.
fn resolve_path(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(&path) {
        return canonical;
    }
    std::path::absolute(&path).unwrap_or(path)
}
