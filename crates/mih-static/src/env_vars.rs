/// Declares all environment variables read by the import hook and its crates.
pub struct EnvVars;

impl EnvVars {
    /// The directory in which the import hook stores build statuses and scratch projects.
    ///
    /// Each interpreter gets its own subdirectory, keyed by the interpreter version and a hash
    /// of its `sys.exec_prefix`.
    pub const MATURIN_BUILD_DIR: &'static str = "MATURIN_BUILD_DIR";

    /// How long (in seconds) to wait for the build cache lock before giving up. Set to `none`
    /// to wait forever.
    pub const MATURIN_IMPORT_HOOK_LOCK_TIMEOUT: &'static str = "MATURIN_IMPORT_HOOK_LOCK_TIMEOUT";

    /// Always rebuild on import, skipping the up-to-date check.
    pub const MATURIN_IMPORT_HOOK_FORCE_REBUILD: &'static str =
        "MATURIN_IMPORT_HOOK_FORCE_REBUILD";

    /// Path to the `maturin` executable, in lieu of searching the `PATH`.
    pub const MATURIN: &'static str = "MATURIN";

    /// Path to the Python interpreter used by the `mih` command line.
    pub const MATURIN_IMPORT_HOOK_PYTHON: &'static str = "MATURIN_IMPORT_HOOK_PYTHON";

    /// The active virtual environment, used to locate a default interpreter.
    pub const VIRTUAL_ENV: &'static str = "VIRTUAL_ENV";

    /// Used to determine the user cache directory on Linux.
    pub const XDG_CACHE_HOME: &'static str = "XDG_CACHE_HOME";

    /// Used to determine the user cache directory on Windows.
    pub const LOCALAPPDATA: &'static str = "LOCALAPPDATA";

    /// Standard `RUST_LOG` environment variable, used to filter log output.
    pub const RUST_LOG: &'static str = "RUST_LOG";

    /// Used to search for executables, such as `maturin` and `python`.
    pub const PATH: &'static str = "PATH";
}
