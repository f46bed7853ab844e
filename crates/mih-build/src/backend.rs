use std::cell::Cell;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::Duration;

use tracing::{debug, enabled, error, Level};

use mih_fs::Simplified;
use mih_static::EnvVars;

use crate::{BuildCommand, BuildFailedError, BuildSettings, Error, has_warnings};

/// How long to keep reading the output of the build tool after it exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// The external build tool, as used by the import hook.
///
/// Every method returns the combined stdout and stderr of the tool on success.
pub trait BuildBackend: Send + Sync {
    /// Build the project with the manifest at `manifest_path` and install it into the current
    /// environment in editable mode.
    fn develop(&self, manifest_path: &Path, settings: &BuildSettings) -> Result<String, Error>;

    /// Build a wheel for `interpreter` from the project with the manifest at `manifest_path`,
    /// writing it to `out_dir`.
    fn build_wheel(
        &self,
        manifest_path: &Path,
        interpreter: &Path,
        out_dir: &Path,
        settings: &BuildSettings,
    ) -> Result<String, Error>;

    /// Generate a new project with PyO3 bindings at `project_dir`.
    fn new_project(&self, project_dir: &Path) -> Result<String, Error>;
}

/// Runs `maturin` as a subprocess.
#[derive(Debug, Clone, Default)]
pub struct MaturinBackend {
    /// An explicit path to `maturin`; when unset, `$MATURIN` and then the `PATH` are searched
    /// on every invocation.
    executable: Option<PathBuf>,
}

impl MaturinBackend {
    /// Use the `maturin` at `executable`.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }

    /// Locate `maturin`.
    pub fn find(&self) -> Result<PathBuf, Error> {
        if let Some(executable) = &self.executable {
            return Ok(executable.clone());
        }
        if let Some(executable) = std::env::var_os(EnvVars::MATURIN).filter(|value| !value.is_empty())
        {
            return Ok(PathBuf::from(executable));
        }
        which::which("maturin").map_err(Error::ToolNotFound)
    }

    /// Run `maturin` with `args`, capturing stdout and stderr interleaved in a single stream.
    fn run(&self, args: &[OsString]) -> Result<String, Error> {
        let maturin = self.find()?;
        debug!("Using maturin at `{}`", maturin.user_display());

        let _guard = BuildGuard::enter();

        let (mut reader, writer) = std::io::pipe()?;
        let mut command = Command::new(&maturin);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        let mut child = command
            .spawn()
            .map_err(|err| Error::CommandFailed(maturin.clone(), err))?;
        // The command holds the write ends of the pipe, which must be closed to observe the end
        // of the output.
        drop(command);

        let output = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (done_tx, done_rx) = mpsc::channel();
        {
            let output = output.clone();
            std::thread::spawn(move || {
                let mut buffer = [0u8; 8192];
                let result = loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => break Ok(()),
                        Ok(n) => output
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&buffer[..n]),
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => break Err(err),
                    }
                };
                // The receiver is gone if the build was abandoned.
                let _ = done_tx.send(result);
            });
        }

        let status = child.wait()?;
        // Processes spawned by the build (e.g. a compiler cache server) can inherit the write end
        // of the pipe and keep it open long after `maturin` exits.
        match done_rx.recv_timeout(OUTPUT_DRAIN_TIMEOUT) {
            Ok(result) => result?,
            Err(_) => debug!(
                "Output pipe of `{}` is still open after it exited, ignoring further output",
                maturin.user_display()
            ),
        }
        let output = String::from_utf8_lossy(
            &output.lock().unwrap_or_else(PoisonError::into_inner),
        )
        .into_owned();

        let command_line = std::iter::once(maturin.simplified_display().to_string())
            .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ");

        if !status.success() {
            error!("command `{command_line}` returned non-zero exit status: {status}");
            error!("maturin output:\n{output}");
            return Err(Error::BuildFailed(BuildFailedError {
                command: command_line,
                status,
                output,
            }));
        }

        if enabled!(Level::DEBUG) {
            debug!(
                "maturin output (has warnings: {}):\n{output}",
                has_warnings(&output)
            );
        }
        Ok(output)
    }
}

impl BuildBackend for MaturinBackend {
    fn develop(&self, manifest_path: &Path, settings: &BuildSettings) -> Result<String, Error> {
        check_supported(settings, BuildCommand::Develop)?;
        let mut args: Vec<OsString> = vec![
            "develop".into(),
            "--manifest-path".into(),
            manifest_path.into(),
        ];
        args.extend(settings.to_args().into_iter().map(OsString::from));
        self.run(&args)
    }

    fn build_wheel(
        &self,
        manifest_path: &Path,
        interpreter: &Path,
        out_dir: &Path,
        settings: &BuildSettings,
    ) -> Result<String, Error> {
        check_supported(settings, BuildCommand::Build)?;
        let mut args: Vec<OsString> = vec![
            "build".into(),
            "--manifest-path".into(),
            manifest_path.into(),
            "--interpreter".into(),
            interpreter.into(),
            "--out".into(),
            out_dir.into(),
        ];
        args.extend(settings.to_args().into_iter().map(OsString::from));
        self.run(&args)
    }

    fn new_project(&self, project_dir: &Path) -> Result<String, Error> {
        self.run(&[
            "new".into(),
            "--bindings".into(),
            "pyo3".into(),
            project_dir.into(),
        ])
    }
}

/// Refuse to run `command` with settings that don't support it.
pub fn check_supported(settings: &BuildSettings, command: BuildCommand) -> Result<(), Error> {
    if settings.supports(command) {
        Ok(())
    } else {
        Err(Error::UnsupportedCommand(command))
    }
}

thread_local! {
    static BUILDS_IN_PROGRESS: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running the build tool until dropped.
///
/// The import hook declines to handle imports while a build is in progress on the same thread,
/// so that anything the build itself imports is resolved normally.
#[derive(Debug)]
#[must_use]
pub struct BuildGuard(());

impl BuildGuard {
    pub fn enter() -> Self {
        BUILDS_IN_PROGRESS.with(|count| count.set(count.get() + 1));
        Self(())
    }

    /// Whether a build is in progress on the current thread.
    pub fn is_active() -> bool {
        BUILDS_IN_PROGRESS.with(|count| count.get() > 0)
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDS_IN_PROGRESS.with(|count| count.set(count.get().saturating_sub(1)));
    }
}
