use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mih_hook::LockTimeout;
use mih_static::EnvVars;

#[derive(Parser)]
#[command(name = "mih", author, version, about)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    #[command(flatten)]
    pub(crate) global_args: GlobalArgs,
}

#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    pub(crate) verbose: bool,

    /// Control colors in output.
    #[arg(global = true, long, value_enum, default_value = "auto")]
    pub(crate) color: ColorChoice,

    /// The Python interpreter to import modules for.
    ///
    /// Defaults to the interpreter of the active virtual environment, then `python3` on the
    /// `PATH`.
    #[arg(global = true, long, env = EnvVars::MATURIN_IMPORT_HOOK_PYTHON)]
    pub(crate) python: Option<PathBuf>,

    /// Path to the build directory.
    ///
    /// Defaults to a directory per interpreter inside the user cache directory.
    #[arg(global = true, long, env = EnvVars::MATURIN_BUILD_DIR)]
    pub(crate) build_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub(crate) enum ColorChoice {
    /// Enables colored output only when the output is going to a terminal or TTY with support.
    Auto,

    /// Enables colored output regardless of the detected environment.
    Always,

    /// Disables colored output.
    Never,
}

impl From<ColorChoice> for anstream::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => Self::Auto,
            ColorChoice::Always => Self::Always,
            ColorChoice::Never => Self::Never,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Import a module through the import hook, rebuilding it if it is out of date.
    Import(ImportArgs),
    /// Manage the build cache.
    Cache(CacheNamespace),
    /// Inspect maturin projects.
    Project(ProjectNamespace),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct ImportArgs {
    /// The dotted name of the module, e.g. `my_project.submodule`.
    pub(crate) module: String,

    /// Rebuild even if the module is up to date.
    #[arg(long)]
    pub(crate) force_rebuild: bool,

    /// Seconds to wait for the build cache lock, or `none` to wait forever.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) lock_timeout: Option<LockTimeout>,

    /// Only rebuild projects that are already installed in editable mode.
    #[arg(long)]
    pub(crate) no_install_new_packages: bool,

    /// Don't rebuild maturin projects.
    #[arg(long)]
    pub(crate) no_project_importer: bool,

    /// Don't build standalone `.rs` files.
    #[arg(long)]
    pub(crate) no_rs_file_importer: bool,

    /// Don't report compiler warnings of successful builds.
    #[arg(long)]
    pub(crate) no_show_warnings: bool,

    /// A directory name to ignore when checking whether a project changed; may be provided
    /// more than once. Replaces the default list.
    #[arg(long = "exclude-dir", value_name = "NAME")]
    pub(crate) excluded_dir_names: Vec<String>,

    /// Path to the `maturin` executable.
    #[arg(long, env = EnvVars::MATURIN)]
    pub(crate) maturin: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) build: BuildArgs,
}

/// Flags forwarded to `maturin`.
#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct BuildArgs {
    /// Build in release mode.
    #[arg(long, short)]
    pub(crate) release: bool,

    /// Strip the built library.
    #[arg(long)]
    pub(crate) strip: bool,

    /// The number of parallel compiler jobs.
    #[arg(long, short)]
    pub(crate) jobs: Option<usize>,

    /// A Cargo feature to activate; may be provided more than once.
    #[arg(long = "features", short = 'F', value_delimiter = ',')]
    pub(crate) features: Vec<String>,

    /// Activate all Cargo features.
    #[arg(long)]
    pub(crate) all_features: bool,

    /// Don't activate the default Cargo features.
    #[arg(long)]
    pub(crate) no_default_features: bool,

    /// Require `Cargo.lock` to be up to date.
    #[arg(long)]
    pub(crate) locked: bool,

    /// Build without accessing the network.
    #[arg(long)]
    pub(crate) offline: bool,
}

#[derive(Args)]
pub(crate) struct CacheNamespace {
    #[command(subcommand)]
    pub(crate) command: CacheCommand,
}

#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Show the build directory.
    Dir,
    /// Remove all build statuses and single-file builds.
    Clear,
    /// Show the recorded build of a project directory or `.rs` file, or count the recorded
    /// builds.
    Status(CacheStatusArgs),
}

#[derive(Args)]
pub(crate) struct CacheStatusArgs {
    /// A project directory or `.rs` file.
    pub(crate) source: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct ProjectNamespace {
    #[command(subcommand)]
    pub(crate) command: ProjectCommand,
}

#[derive(Subcommand)]
pub(crate) enum ProjectCommand {
    /// Show how the import hook sees the maturin project containing a directory.
    Show(ProjectShowArgs),
}

#[derive(Args)]
pub(crate) struct ProjectShowArgs {
    /// A directory inside the project.
    #[arg(default_value = ".")]
    pub(crate) dir: PathBuf,
}
