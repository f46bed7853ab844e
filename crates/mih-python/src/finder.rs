use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use tracing::trace;

const SOURCE_SUFFIX: &str = ".py";
const BYTECODE_SUFFIX: &str = ".pyc";

/// How a found module would be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// A directory with an `__init__` file.
    Package,
    /// A directory without an `__init__` file, possibly spread over several search path entries.
    Namespace,
    /// A compiled extension module.
    Extension,
    /// A `.py` file.
    Source,
    /// A `.pyc` file.
    Bytecode,
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package => f.write_str("package"),
            Self::Namespace => f.write_str("namespace package"),
            Self::Extension => f.write_str("extension module"),
            Self::Source => f.write_str("source module"),
            Self::Bytecode => f.write_str("bytecode module"),
        }
    }
}

/// Where a module was found and how to load it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    /// The fully qualified module name.
    pub name: String,
    /// The file the module is loaded from; `None` for namespace packages.
    pub origin: Option<PathBuf>,
    pub kind: ModuleKind,
    /// Where submodules are searched for; empty unless the module is a package.
    pub submodule_search_locations: Vec<PathBuf>,
}

impl ModuleSpec {
    /// A spec for the extension module at `path`.
    pub fn extension(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            origin: Some(path),
            kind: ModuleKind::Extension,
            submodule_search_locations: Vec::new(),
        }
    }
}

/// Search `search_path` for the module `fullname` the way the interpreter's path-based finder
/// does: a regular package or module in an earlier entry wins, and directories without
/// `__init__` only produce a namespace package if nothing else is found.
///
/// Only the last component of `fullname` is looked up; `search_path` is expected to be the
/// search path of the parent package for submodules.
pub fn find_spec(
    fullname: &str,
    search_path: &[PathBuf],
    extension_suffixes: &[String],
) -> Option<ModuleSpec> {
    let name = fullname.rsplit('.').next().unwrap_or(fullname);
    let mut namespace_portions = Vec::new();

    for entry in search_path {
        let package_dir = entry.join(name);
        if package_dir.is_dir() {
            if let Some((init, kind)) =
                find_module_file(&package_dir, "__init__", extension_suffixes)
            {
                trace!("Found package `{fullname}` at `{}` ({kind})", init.display());
                return Some(ModuleSpec {
                    name: fullname.to_string(),
                    origin: Some(init),
                    kind: ModuleKind::Package,
                    submodule_search_locations: vec![package_dir],
                });
            }
        }

        if let Some((path, kind)) = find_module_file(entry, name, extension_suffixes) {
            trace!("Found `{fullname}` at `{}` ({kind})", path.display());
            return Some(ModuleSpec {
                name: fullname.to_string(),
                origin: Some(path),
                kind,
                submodule_search_locations: Vec::new(),
            });
        }

        if package_dir.is_dir() {
            namespace_portions.push(package_dir);
        }
    }

    if namespace_portions.is_empty() {
        None
    } else {
        Some(ModuleSpec {
            name: fullname.to_string(),
            origin: None,
            kind: ModuleKind::Namespace,
            submodule_search_locations: namespace_portions,
        })
    }
}

/// Find the extension module `module_name` directly inside `dir`, trying each suffix in order.
pub fn find_extension_module(
    dir: &Path,
    module_name: &str,
    extension_suffixes: &[String],
) -> Option<PathBuf> {
    extension_suffixes
        .iter()
        .map(|suffix| dir.join(format!("{module_name}{suffix}")))
        .find(|path| path.exists())
}

fn find_module_file(
    dir: &Path,
    name: &str,
    extension_suffixes: &[String],
) -> Option<(PathBuf, ModuleKind)> {
    if let Some(path) = find_extension_module(dir, name, extension_suffixes) {
        return Some((path, ModuleKind::Extension));
    }
    [
        (SOURCE_SUFFIX, ModuleKind::Source),
        (BYTECODE_SUFFIX, ModuleKind::Bytecode),
    ]
    .into_iter()
    .map(|(suffix, kind)| (dir.join(format!("{name}{suffix}")), kind))
    .find(|(path, _)| path.is_file())
}
