use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jiff::{SignedDuration, Timestamp};
use owo_colors::OwoColorize;

use mih_build::{has_warnings, last_line};
use mih_cache::BuildCache;
use mih_fs::Simplified;

use crate::commands::{ExitStatus, resolve_build_dir};
use crate::printer::Printer;

/// Show the build directory.
pub(crate) fn cache_dir(
    python: Option<&Path>,
    build_dir: Option<PathBuf>,
    printer: Printer,
) -> Result<ExitStatus> {
    let build_dir = resolve_build_dir(python, build_dir)?;
    writeln!(printer.stdout(), "{}", build_dir.simplified_display().cyan())?;
    Ok(ExitStatus::Success)
}

/// Remove every build status and single-file build.
pub(crate) fn cache_clear(
    python: Option<&Path>,
    build_dir: Option<PathBuf>,
    printer: Printer,
) -> Result<ExitStatus> {
    let build_dir = resolve_build_dir(python, build_dir)?;
    if !build_dir.exists() {
        writeln!(
            printer.stderr(),
            "No build cache found at: {}",
            build_dir.user_display().cyan()
        )?;
        return Ok(ExitStatus::Success);
    }

    writeln!(
        printer.stderr(),
        "Clearing build cache at: {}",
        build_dir.user_display().cyan()
    )?;
    let mut cache = BuildCache::new(&build_dir, None)?;
    let cache = cache.lock()?;
    let num_build_statuses = cache.num_build_statuses();
    cache
        .clear()
        .with_context(|| format!("Failed to clear build cache at: {}", build_dir.user_display()))?;

    match num_build_statuses {
        0 => writeln!(printer.stderr(), "No build statuses found")?,
        1 => writeln!(printer.stderr(), "Removed 1 build status")?,
        num => writeln!(printer.stderr(), "Removed {num} build statuses")?,
    }
    Ok(ExitStatus::Success)
}

/// Show the recorded build of `source`, or the number of recorded builds.
pub(crate) fn cache_status(
    source: Option<&Path>,
    python: Option<&Path>,
    build_dir: Option<PathBuf>,
    printer: Printer,
) -> Result<ExitStatus> {
    let build_dir = resolve_build_dir(python, build_dir)?;
    let mut cache = BuildCache::new(&build_dir, None)?;
    let cache = cache.lock()?;

    let Some(source) = source else {
        writeln!(
            printer.stdout(),
            "{} build statuses in {}",
            cache.num_build_statuses(),
            build_dir.user_display().cyan()
        )?;
        return Ok(ExitStatus::Success);
    };

    let source = std::path::absolute(source)?;
    let Some(status) = cache.get_build_status(&source) else {
        writeln!(
            printer.stderr(),
            "No build recorded for: {}",
            source.user_display().cyan()
        )?;
        return Ok(ExitStatus::Failure);
    };

    writeln!(printer.stdout(), "{}: {}", "Source".bold(), status.source_path.user_display())?;
    match SignedDuration::try_from_secs_f64(status.build_mtime)
        .ok()
        .and_then(|duration| Timestamp::from_duration(duration).ok())
    {
        Some(timestamp) => writeln!(printer.stdout(), "{}: {timestamp}", "Built".bold())?,
        None => writeln!(printer.stdout(), "{}: {}", "Built".bold(), status.build_mtime)?,
    }
    writeln!(
        printer.stdout(),
        "{}: {}",
        "Arguments".bold(),
        status.build_args.join(" ")
    )?;
    if let Some(line) = last_line(&status.build_output) {
        writeln!(printer.stdout(), "{}: {line}", "Output".bold())?;
    }
    if has_warnings(&status.build_output) {
        writeln!(printer.stdout(), "{}", "The build produced warnings".yellow())?;
    }
    Ok(ExitStatus::Success)
}
