use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use mih_fs::Simplified;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Show how the import hook resolves the maturin project containing `dir`.
pub(crate) fn project_show(dir: &Path, printer: Printer) -> Result<ExitStatus> {
    let dir = std::path::absolute(dir)?;
    let Some(project_dir) = mih_project::find_maybe_maturin_project_above(&dir) else {
        writeln!(
            printer.stderr(),
            "No maturin project found at or above: {}",
            dir.user_display().cyan()
        )?;
        return Ok(ExitStatus::Failure);
    };

    let project = mih_project::resolve_project(&project_dir).with_context(|| {
        format!(
            "Failed to resolve the project at: {}",
            project_dir.user_display()
        )
    })?;

    let mut stdout = printer.stdout();
    writeln!(stdout, "{}: {}", "Project".bold(), project.project_dir().user_display())?;
    writeln!(stdout, "{}: {}", "Manifest".bold(), project.manifest_path().user_display())?;
    writeln!(stdout, "{}: {}", "Module".bold(), project.module_full_name())?;
    if project.is_mixed() {
        writeln!(stdout, "{}: mixed Rust/Python", "Layout".bold())?;
        writeln!(stdout, "{}: {}", "Python source".bold(), project.python_dir().user_display())?;
        if let Some(extension_module_dir) = project.extension_module_dir() {
            writeln!(
                stdout,
                "{}: {}",
                "Extension directory".bold(),
                extension_module_dir.user_display()
            )?;
        }
    } else {
        writeln!(stdout, "{}: pure Rust", "Layout".bold())?;
    }

    let dependencies = project.all_path_dependencies();
    if dependencies.is_empty() {
        writeln!(stdout, "{}: none", "Path dependencies".bold())?;
    } else {
        writeln!(stdout, "{}:", "Path dependencies".bold())?;
        for dependency in dependencies {
            writeln!(stdout, "  {}", dependency.user_display())?;
        }
    }
    Ok(ExitStatus::Success)
}
