use std::fmt::{Display, Formatter};
use std::path::Path;

/// A `maturin` subcommand used by the import hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildCommand {
    /// Build and install the project into the current environment in editable mode.
    Develop,
    /// Build a wheel.
    Build,
    /// Generate a new project.
    New,
}

impl Display for BuildCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Develop => f.write_str("develop"),
            Self::Build => f.write_str("build"),
            Self::New => f.write_str("new"),
        }
    }
}

/// Settings that only apply to one of the build commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommandOptions {
    /// No command-specific settings; usable with both `develop` and `build`.
    #[default]
    Any,
    /// Settings for `maturin develop`.
    Develop {
        /// Extras of the project to install (`--extras`).
        extras: Vec<String>,
        /// Build without installing (`--skip-install`).
        skip_install: bool,
        /// Install with `uv` instead of `pip` (`--uv`).
        uv: bool,
    },
    /// Settings for `maturin build`.
    Build {
        /// The `auditwheel` mode (`--auditwheel`).
        auditwheel: Option<String>,
        /// Link with `zig` (`--zig`).
        zig: bool,
    },
}

/// The flags passed to `maturin` when building.
///
/// The flags produced by [`BuildSettings::to_args`] are recorded with each build, so two
/// settings that produce different flags always cause a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    pub release: bool,
    pub strip: bool,
    pub quiet: bool,
    pub jobs: Option<usize>,
    pub features: Option<Vec<String>>,
    pub all_features: bool,
    pub no_default_features: bool,
    pub frozen: bool,
    pub locked: bool,
    pub offline: bool,
    pub command: CommandOptions,
}

impl BuildSettings {
    /// The commands these settings can be used with.
    pub fn supported_commands(&self) -> &'static [BuildCommand] {
        match self.command {
            CommandOptions::Any => &[BuildCommand::Build, BuildCommand::Develop],
            CommandOptions::Develop { .. } => &[BuildCommand::Develop],
            CommandOptions::Build { .. } => &[BuildCommand::Build],
        }
    }

    /// Whether these settings can be used with `command`.
    pub fn supports(&self, command: BuildCommand) -> bool {
        self.supported_commands().contains(&command)
    }

    /// The command line flags corresponding to these settings.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.release {
            args.push("--release".to_string());
        }
        if self.strip {
            args.push("--strip".to_string());
        }
        if self.quiet {
            args.push("--quiet".to_string());
        }
        if let Some(jobs) = self.jobs {
            args.push("--jobs".to_string());
            args.push(jobs.to_string());
        }
        if let Some(features) = self.features.as_ref().filter(|features| !features.is_empty()) {
            args.push("--features".to_string());
            args.push(features.join(","));
        }
        if self.all_features {
            args.push("--all-features".to_string());
        }
        if self.no_default_features {
            args.push("--no-default-features".to_string());
        }
        if self.frozen {
            args.push("--frozen".to_string());
        }
        if self.locked {
            args.push("--locked".to_string());
        }
        if self.offline {
            args.push("--offline".to_string());
        }
        match &self.command {
            CommandOptions::Any => {}
            CommandOptions::Develop {
                extras,
                skip_install,
                uv,
            } => {
                if !extras.is_empty() {
                    args.push("--extras".to_string());
                    args.push(extras.join(","));
                }
                if *skip_install {
                    args.push("--skip-install".to_string());
                }
                if *uv {
                    args.push("--uv".to_string());
                }
            }
            CommandOptions::Build { auditwheel, zig } => {
                if let Some(auditwheel) = auditwheel {
                    args.push("--auditwheel".to_string());
                    args.push(auditwheel.clone());
                }
                if *zig {
                    args.push("--zig".to_string());
                }
            }
        }
        args
    }
}

/// Chooses the [`BuildSettings`] for each module or project the import hook builds.
pub trait SettingsProvider: Send + Sync {
    /// The settings for building the module `module_path` from `source_path` (a project
    /// directory or a single Rust file).
    fn get_settings(&self, module_path: &str, source_path: &Path) -> BuildSettings;
}

/// The same settings for everything.
impl SettingsProvider for BuildSettings {
    fn get_settings(&self, _module_path: &str, _source_path: &Path) -> BuildSettings {
        self.clone()
    }
}
