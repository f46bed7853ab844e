use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::debug;

use mih_build::{BuildBackend, BuildSettings, MaturinBackend};
use mih_fs::Simplified;
use mih_hook::{HookOptions, ImportError, MetaPath};

use crate::cli::{BuildArgs, ImportArgs};
use crate::commands::{ExitStatus, elapsed, find_interpreter};
use crate::printer::Printer;

impl From<BuildArgs> for BuildSettings {
    fn from(args: BuildArgs) -> Self {
        Self {
            release: args.release,
            strip: args.strip,
            jobs: args.jobs,
            features: (!args.features.is_empty()).then_some(args.features),
            all_features: args.all_features,
            no_default_features: args.no_default_features,
            locked: args.locked,
            offline: args.offline,
            ..Self::default()
        }
    }
}

/// Import a module through the import hooks and report where it was found.
pub(crate) fn import(
    args: ImportArgs,
    python: Option<&Path>,
    build_dir: Option<PathBuf>,
    printer: Printer,
) -> Result<ExitStatus> {
    let interpreter = Arc::new(find_interpreter(python)?);

    // Unset flags leave the option to the environment.
    let options = HookOptions {
        build_dir,
        lock_timeout: args.lock_timeout,
        force_rebuild: args.force_rebuild.then_some(true),
        install_new_packages: args.no_install_new_packages.then_some(false),
        excluded_dir_names: (!args.excluded_dir_names.is_empty())
            .then_some(args.excluded_dir_names),
        show_warnings: args.no_show_warnings.then_some(false),
        enable_project_importer: args.no_project_importer.then_some(false),
        enable_rs_file_importer: args.no_rs_file_importer.then_some(false),
        settings: Some(BuildSettings::from(args.build)),
    };
    let settings = options
        .resolve(&interpreter)
        .context("Failed to resolve the import hook settings")?;

    let backend: Arc<dyn BuildBackend> = Arc::new(match args.maturin {
        Some(maturin) => MaturinBackend::with_executable(maturin),
        None => MaturinBackend::default(),
    });

    let mut meta_path = MetaPath::with_path_finder(interpreter.clone());
    let hooks = mih_hook::install(&mut meta_path, &settings, &interpreter, &backend)?;

    let start = Instant::now();
    let result = meta_path.import(&args.module);
    mih_hook::uninstall(&mut meta_path, hooks);

    match result {
        Ok(spec) => {
            debug!("Imported `{}` in {}", spec.name, elapsed(start.elapsed()));
            match &spec.origin {
                Some(origin) => writeln!(
                    printer.stdout(),
                    "{} ({}): {}",
                    spec.name.bold(),
                    spec.kind,
                    origin.user_display().cyan()
                )?,
                None => writeln!(printer.stdout(), "{} ({})", spec.name.bold(), spec.kind)?,
            }
            Ok(ExitStatus::Success)
        }
        Err(err @ (ImportError::ModuleNotFound(_) | ImportError::NotAPackage(_))) => {
            writeln!(printer.stderr(), "{}: {err}", "error".red().bold())?;
            Ok(ExitStatus::Failure)
        }
        Err(err) => Err(err).with_context(|| format!("Failed to import `{}`", args.module)),
    }
}
