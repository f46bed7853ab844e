use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};

use mih_hook::HookOptions;
use mih_python::Interpreter;

pub(crate) use cache::{cache_clear, cache_dir, cache_status};
pub(crate) use import::import;
pub(crate) use project::project_show;

mod cache;
mod import;
mod project;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,

    /// The command failed due to an error in the user input.
    Failure,

    /// The command failed with an unexpected error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Failure => Self::from(1),
            ExitStatus::Error => Self::from(2),
        }
    }
}

/// Query the requested interpreter, or the default one.
pub(super) fn find_interpreter(python: Option<&Path>) -> Result<Interpreter> {
    let python = match python {
        Some(python) => python.to_path_buf(),
        None => mih_python::find_default_python()?,
    };
    Ok(Interpreter::query(&python)?)
}

/// The build directory: the requested one, or the default for the interpreter.
pub(super) fn resolve_build_dir(python: Option<&Path>, build_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(build_dir) = build_dir {
        return Ok(build_dir);
    }
    let interpreter = find_interpreter(python)?;
    let settings = HookOptions::default()
        .resolve(&interpreter)
        .context("Failed to resolve the import hook settings")?;
    Ok(settings.build_dir)
}

/// Format a duration as a human-readable string, Cargo-style.
pub(super) fn elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    let ms = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:02}s", secs, duration.subsec_nanos() / 10_000_000)
    } else if ms > 0 {
        format!("{ms}ms")
    } else {
        format!("0.{:02}ms", duration.subsec_nanos() / 10_000)
    }
}
