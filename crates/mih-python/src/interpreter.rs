use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use mih_fs::Simplified;
use mih_static::EnvVars;

use crate::{Error, SearchPath};

/// A Python interpreter, as seen by the import hook.
#[derive(Debug)]
pub struct Interpreter {
    executable: PathBuf,
    version: String,
    exec_prefix: PathBuf,
    search_path: SearchPath,
    extension_suffixes: Vec<String>,
}

impl Interpreter {
    /// Query the interpreter at `executable` for the facts the import hook needs.
    pub fn query(executable: &Path) -> Result<Self, Error> {
        let info = InterpreterQueryResult::query(executable)?;
        debug!(
            "Found Python {} at `{}`",
            info.version,
            info.executable.user_display()
        );
        Ok(Self {
            executable: info.executable,
            version: info.version,
            exec_prefix: info.exec_prefix,
            search_path: SearchPath::new(info.sys_path, info.site_packages),
            extension_suffixes: info.extension_suffixes,
        })
    }

    /// Construct an interpreter from known facts, without running it.
    pub fn from_parts(
        executable: PathBuf,
        version: String,
        exec_prefix: PathBuf,
        search_path: SearchPath,
        extension_suffixes: Vec<String>,
    ) -> Self {
        Self {
            executable,
            version,
            exec_prefix,
            search_path,
            extension_suffixes,
        }
    }

    /// The path to the Python executable (`sys.executable`).
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The full Python version, e.g. `3.12.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `sys.exec_prefix`.
    pub fn exec_prefix(&self) -> &Path {
        &self.exec_prefix
    }

    /// The module search path (`sys.path`).
    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    /// The file suffixes of extension modules, e.g. `.cpython-312-x86_64-linux-gnu.so`, in the
    /// order the interpreter tries them.
    pub fn extension_suffixes(&self) -> &[String] {
        &self.extension_suffixes
    }
}

#[derive(Debug, Deserialize)]
struct InterpreterQueryResult {
    executable: PathBuf,
    version: String,
    exec_prefix: PathBuf,
    sys_path: Vec<PathBuf>,
    site_packages: Vec<PathBuf>,
    extension_suffixes: Vec<String>,
}

impl InterpreterQueryResult {
    fn query(interpreter: &Path) -> Result<Self, Error> {
        let output = Command::new(interpreter)
            .args(["-c", include_str!("get_interpreter_info.py")])
            .output()
            .map_err(|err| Error::PythonSubcommandLaunch {
                interpreter: interpreter.to_path_buf(),
                err,
            })?;

        if !output.status.success() {
            return Err(Error::PythonSubcommandOutput {
                message: format!(
                    "Querying Python at `{}` failed with {}",
                    interpreter.user_display(),
                    output.status,
                ),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice::<Self>(&output.stdout).map_err(|err| {
            Error::PythonSubcommandOutput {
                message: format!(
                    "Querying Python at `{}` did not return the expected data: {err}",
                    interpreter.user_display(),
                ),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        })
    }
}

/// Pick the interpreter to use when none was requested.
///
/// In order of preference: `$MATURIN_IMPORT_HOOK_PYTHON`, the Python of the active virtual
/// environment, then `python3` or `python` on the `PATH`.
pub fn find_default_python() -> Result<PathBuf, Error> {
    if let Some(python) = std::env::var_os(EnvVars::MATURIN_IMPORT_HOOK_PYTHON) {
        return Ok(PathBuf::from(python));
    }

    if let Some(venv) = std::env::var_os(EnvVars::VIRTUAL_ENV) {
        let venv = PathBuf::from(venv);
        let python = if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        };
        if python.is_file() {
            return Ok(python);
        }
        debug!(
            "Ignoring virtual environment without interpreter: `{}`",
            venv.user_display()
        );
    }

    which::which("python3")
        .or_else(|_| which::which("python"))
        .map_err(|_| Error::NoPythonInstalled)
}
