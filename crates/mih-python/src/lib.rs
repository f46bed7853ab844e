use std::io;
use std::path::PathBuf;

use thiserror::Error;

use mih_fs::Simplified;

pub use crate::finder::{ModuleKind, ModuleSpec, find_extension_module, find_spec};
pub use crate::installed::{
    DirInfo, DirectUrl, find_dist_info, fix_direct_url, is_editable_installed_package,
    is_installed_package, read_direct_url,
};
pub use crate::interpreter::{Interpreter, find_default_python};
pub use crate::search_path::SearchPath;

mod finder;
mod installed;
mod interpreter;
mod search_path;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to query Python interpreter at `{}`", interpreter.user_display())]
    PythonSubcommandLaunch {
        interpreter: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    PythonSubcommandOutput {
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("No Python interpreter found; set `VIRTUAL_ENV` or add `python3` to the `PATH`")]
    NoPythonInstalled,
}
