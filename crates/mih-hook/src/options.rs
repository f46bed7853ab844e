use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rustc_hash::FxHashSet;

use mih_build::BuildSettings;
use mih_freshness::DEFAULT_EXCLUDED_DIR_NAMES;
use mih_python::Interpreter;
use mih_static::EnvVars;

/// How long to wait for the build cache lock before giving up.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Failed to parse environment variable `{name}` with invalid value `{value}`: {err}")]
    InvalidEnvironmentVariable {
        name: String,
        value: String,
        err: String,
    },
    #[error("Failed to determine the build directory")]
    BuildDir(#[source] mih_cache::Error),
}

/// A lock timeout: a number of seconds, or `none` to wait forever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockTimeout {
    Never,
    After(Duration),
}

impl LockTimeout {
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(duration) => Some(duration),
        }
    }
}

impl FromStr for LockTimeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::Never);
        }
        let seconds: f64 = s
            .parse()
            .map_err(|_| "expected a number of seconds or `none`".to_string())?;
        Duration::try_from_secs_f64(seconds)
            .map(Self::After)
            .map_err(|_| "expected a non-negative number of seconds".to_string())
    }
}

impl Display for LockTimeout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => f.write_str("none"),
            Self::After(duration) => write!(f, "{}", duration.as_secs_f64()),
        }
    }
}

pub trait Combine {
    /// Combine two values, preferring the values in `self`.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

/// Options for the import hooks, every one of which may be left unset.
///
/// Unset options are taken from the environment, then from the defaults, by
/// [`HookOptions::resolve`].
#[derive(Debug, Clone, Default)]
pub struct HookOptions {
    /// Where build statuses and single-file builds are kept.
    pub build_dir: Option<PathBuf>,
    pub lock_timeout: Option<LockTimeout>,
    /// Rebuild on every import, without checking whether anything changed.
    pub force_rebuild: Option<bool>,
    /// Build and install projects that are not installed yet, or not in editable mode.
    pub install_new_packages: Option<bool>,
    /// Directory names ignored when checking whether a project changed.
    pub excluded_dir_names: Option<Vec<String>>,
    /// Report compiler warnings of successful builds.
    pub show_warnings: Option<bool>,
    pub enable_project_importer: Option<bool>,
    pub enable_rs_file_importer: Option<bool>,
    pub settings: Option<BuildSettings>,
}

impl Combine for HookOptions {
    fn combine(self, other: Self) -> Self {
        Self {
            build_dir: self.build_dir.or(other.build_dir),
            lock_timeout: self.lock_timeout.or(other.lock_timeout),
            force_rebuild: self.force_rebuild.or(other.force_rebuild),
            install_new_packages: self.install_new_packages.or(other.install_new_packages),
            excluded_dir_names: self.excluded_dir_names.or(other.excluded_dir_names),
            show_warnings: self.show_warnings.or(other.show_warnings),
            enable_project_importer: self
                .enable_project_importer
                .or(other.enable_project_importer),
            enable_rs_file_importer: self
                .enable_rs_file_importer
                .or(other.enable_rs_file_importer),
            settings: self.settings.or(other.settings),
        }
    }
}

impl HookOptions {
    /// The options set through environment variables.
    pub fn from_env() -> Result<Self, OptionsError> {
        Ok(Self {
            lock_timeout: parse_environment_variable(EnvVars::MATURIN_IMPORT_HOOK_LOCK_TIMEOUT)?,
            force_rebuild: parse_boolish_environment_variable(
                EnvVars::MATURIN_IMPORT_HOOK_FORCE_REBUILD,
            )?,
            ..Self::default()
        })
    }

    /// Fill in every unset option from the environment and the defaults.
    ///
    /// The build directory defaults to a directory specific to `interpreter`.
    pub fn resolve(self, interpreter: &Interpreter) -> Result<HookSettings, OptionsError> {
        let options = self.combine(Self::from_env()?);
        let build_dir = match options.build_dir {
            Some(build_dir) => build_dir,
            None => mih_cache::default_build_dir(interpreter.version(), interpreter.exec_prefix())
                .map_err(OptionsError::BuildDir)?,
        };
        Ok(HookSettings {
            build_dir,
            lock_timeout: options
                .lock_timeout
                .unwrap_or(LockTimeout::After(DEFAULT_LOCK_TIMEOUT))
                .as_duration(),
            force_rebuild: options.force_rebuild.unwrap_or(false),
            install_new_packages: options.install_new_packages.unwrap_or(true),
            excluded_dir_names: match options.excluded_dir_names {
                Some(names) => names.into_iter().collect(),
                None => DEFAULT_EXCLUDED_DIR_NAMES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
            show_warnings: options.show_warnings.unwrap_or(true),
            enable_project_importer: options.enable_project_importer.unwrap_or(true),
            enable_rs_file_importer: options.enable_rs_file_importer.unwrap_or(true),
            settings: options.settings.unwrap_or_default(),
        })
    }
}

/// The resolved configuration of the import hooks.
#[derive(Debug, Clone)]
pub struct HookSettings {
    pub build_dir: PathBuf,
    /// `None` to wait for the lock forever.
    pub lock_timeout: Option<Duration>,
    pub force_rebuild: bool,
    pub install_new_packages: bool,
    pub excluded_dir_names: FxHashSet<String>,
    pub show_warnings: bool,
    pub enable_project_importer: bool,
    pub enable_rs_file_importer: bool,
    pub settings: BuildSettings,
}

fn parse_environment_variable<T>(name: &'static str) -> Result<Option<T>, OptionsError>
where
    T: FromStr<Err = String>,
{
    let Some(value) = std::env::var_os(name) else {
        return Ok(None);
    };
    let Some(value) = value.to_str() else {
        return Err(OptionsError::InvalidEnvironmentVariable {
            name: name.to_string(),
            value: value.to_string_lossy().to_string(),
            err: "expected a valid UTF-8 string".to_string(),
        });
    };
    value
        .parse()
        .map(Some)
        .map_err(|err| OptionsError::InvalidEnvironmentVariable {
            name: name.to_string(),
            value: value.to_string(),
            err,
        })
}

/// Parse a boolean environment variable, accepting the same values as Clap's
/// `BoolishValueParser`.
fn parse_boolish_environment_variable(name: &'static str) -> Result<Option<bool>, OptionsError> {
    // True values are `y`, `yes`, `t`, `true`, `on`, and `1`.
    const TRUE_LITERALS: [&str; 6] = ["y", "yes", "t", "true", "on", "1"];

    // False values are `n`, `no`, `f`, `false`, `off`, and `0`.
    const FALSE_LITERALS: [&str; 6] = ["n", "no", "f", "false", "off", "0"];

    struct Boolish(bool);

    impl FromStr for Boolish {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let pat: &str = &s.to_lowercase();
            if TRUE_LITERALS.contains(&pat) {
                Ok(Self(true))
            } else if FALSE_LITERALS.contains(&pat) {
                Ok(Self(false))
            } else {
                Err("expected a boolish value".to_string())
            }
        }
    }

    Ok(parse_environment_variable::<Boolish>(name)?.map(|Boolish(value)| value))
}
