use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use mih_python::{Interpreter, ModuleSpec};

use crate::ImportError;

/// Something that can locate modules, consulted in order by a [`MetaPath`].
pub trait Finder: Debug + Send + Sync {
    /// Locate the module `fullname`.
    ///
    /// `path` is the search path of the parent package for submodules, and `None` for top-level
    /// modules. Returns `Ok(None)` to let the next finder try.
    fn find_spec(
        &self,
        fullname: &str,
        path: Option<&[PathBuf]>,
        modules: &LoadedModules,
    ) -> Result<Option<ModuleSpec>, ImportError>;
}

/// The modules that have already been imported, by fully qualified name.
#[derive(Debug, Default, Clone)]
pub struct LoadedModules(FxHashMap<String, ModuleSpec>);

impl LoadedModules {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.0.get(name)
    }

    pub fn insert(&mut self, spec: ModuleSpec) {
        self.0.insert(spec.name.clone(), spec);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identifies a finder installed on a [`MetaPath`]; pass it back to
/// [`MetaPath::uninstall`] to remove the finder.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct HookHandle(u64);

/// An ordered list of finders, and the modules imported through them.
#[derive(Debug, Default)]
pub struct MetaPath {
    finders: Vec<(u64, Arc<dyn Finder>)>,
    modules: LoadedModules,
    next_id: u64,
}

impl MetaPath {
    /// A meta path that only finds modules through the interpreter's own search path.
    pub fn with_path_finder(interpreter: Arc<Interpreter>) -> Self {
        let mut meta_path = Self::default();
        let handle = meta_path.install(Arc::new(PathFinder::new(interpreter)));
        // The path finder stays installed for the lifetime of the meta path.
        drop(handle);
        meta_path
    }

    /// Insert `finder` in front of every other finder.
    pub fn install(&mut self, finder: Arc<dyn Finder>) -> HookHandle {
        let id = self.next_id;
        self.next_id += 1;
        trace!("Installing finder {id}: {finder:?}");
        self.finders.insert(0, (id, finder));
        HookHandle(id)
    }

    /// Remove the finder identified by `handle`, returning it if it was still installed.
    pub fn uninstall(&mut self, handle: HookHandle) -> Option<Arc<dyn Finder>> {
        let index = self.finders.iter().position(|(id, _)| *id == handle.0)?;
        let (_, finder) = self.finders.remove(index);
        trace!("Uninstalled finder {}", handle.0);
        Some(finder)
    }

    /// The number of installed finders.
    pub fn len(&self) -> usize {
        self.finders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finders.is_empty()
    }

    pub fn modules(&self) -> &LoadedModules {
        &self.modules
    }

    /// Record `spec` as imported, so that finders skip it from now on.
    pub fn mark_loaded(&mut self, spec: ModuleSpec) {
        self.modules.insert(spec);
    }

    /// Ask each finder in turn for `fullname`, returning the first match.
    pub fn find_spec(
        &self,
        fullname: &str,
        path: Option<&[PathBuf]>,
    ) -> Result<Option<ModuleSpec>, ImportError> {
        for (_, finder) in &self.finders {
            if let Some(spec) = finder.find_spec(fullname, path, &self.modules)? {
                return Ok(Some(spec));
            }
        }
        Ok(None)
    }

    /// Import `fullname` and each of its parent packages, parents first.
    ///
    /// Modules that are already loaded are not searched for again.
    pub fn import(&mut self, fullname: &str) -> Result<ModuleSpec, ImportError> {
        let mut parent: Option<ModuleSpec> = None;
        let mut end = 0;
        loop {
            end = fullname[end..]
                .find('.')
                .map_or(fullname.len(), |index| end + index);
            let name = &fullname[..end];

            let spec = if let Some(spec) = self.modules.get(name) {
                spec.clone()
            } else {
                let path = parent
                    .as_ref()
                    .map(|parent| parent.submodule_search_locations.as_slice());
                if path.is_some_and(<[PathBuf]>::is_empty) {
                    return Err(ImportError::NotAPackage(
                        parent.map(|parent| parent.name).unwrap_or_default(),
                    ));
                }
                let spec = self
                    .find_spec(name, path)?
                    .ok_or_else(|| ImportError::ModuleNotFound(name.to_string()))?;
                debug!("Imported `{name}` ({})", spec.kind);
                self.mark_loaded(spec.clone());
                spec
            };

            if end == fullname.len() {
                return Ok(spec);
            }
            parent = Some(spec);
            end += 1;
        }
    }
}

/// Finds modules on the interpreter's search path, like the interpreter's own path-based
/// finder.
#[derive(Debug)]
pub struct PathFinder {
    interpreter: Arc<Interpreter>,
}

impl PathFinder {
    pub fn new(interpreter: Arc<Interpreter>) -> Self {
        Self { interpreter }
    }
}

impl Finder for PathFinder {
    fn find_spec(
        &self,
        fullname: &str,
        path: Option<&[PathBuf]>,
        _modules: &LoadedModules,
    ) -> Result<Option<ModuleSpec>, ImportError> {
        let search_path = match path {
            Some(path) => path.to_vec(),
            None => self.interpreter.search_path().entries(),
        };
        Ok(mih_python::find_spec(
            fullname,
            &search_path,
            self.interpreter.extension_suffixes(),
        ))
    }
}
