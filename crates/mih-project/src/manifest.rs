//! The subset of `pyproject.toml` and `Cargo.toml` needed to resolve a project's layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PyProjectToml {
    pub(crate) project: Option<Project>,
    pub(crate) tool: Option<Tool>,
}

impl PyProjectToml {
    pub(crate) fn maturin(&self) -> Option<&ToolMaturin> {
        self.tool.as_ref().and_then(|tool| tool.maturin.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Project {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Tool {
    pub(crate) maturin: Option<ToolMaturin>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ToolMaturin {
    pub(crate) manifest_path: Option<PathBuf>,
    pub(crate) module_name: Option<String>,
    pub(crate) python_source: Option<PathBuf>,
    #[serde(default)]
    pub(crate) python_packages: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CargoToml {
    pub(crate) package: Option<CargoPackage>,
    pub(crate) lib: Option<CargoLib>,
    #[serde(default)]
    pub(crate) dependencies: BTreeMap<String, Dependency>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CargoPackage {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CargoLib {
    pub(crate) name: Option<String>,
}

/// A `[dependencies]` entry: either a version string or a table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Dependency {
    /// Ex) `serde = { version = "1", features = ["derive"] }` or `local = { path = "../local" }`
    Detailed { path: Option<PathBuf> },
    /// Ex) `serde = "1"`
    Simple(toml::Value),
}

impl CargoToml {
    /// The `path` dependencies joined onto `manifest_dir`, ordered by dependency name.
    pub(crate) fn path_dependencies<'a>(
        &'a self,
        manifest_dir: &'a Path,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        self.dependencies
            .values()
            .filter_map(move |dependency| match dependency {
                Dependency::Detailed { path: Some(path) } => Some(manifest_dir.join(path)),
                Dependency::Detailed { path: None } | Dependency::Simple(_) => None,
            })
    }
}
