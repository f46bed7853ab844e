#![allow(dead_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use filetime::FileTime;
use rustc_hash::FxHashSet;
use zip::write::SimpleFileOptions;

use mih_build::{BuildBackend, BuildCommand, BuildSettings, Error, check_supported};
use mih_hook::HookSettings;
use mih_python::{DirectUrl, Interpreter, SearchPath};

pub const EXTENSION_SUFFIX: &str = ".cpython-312-x86_64-linux-gnu.so";

/// Source files are older than anything the fake backend builds.
pub const SOURCE_MTIME: i64 = 1_000;

/// The time the fake backend stamps on the first build.
pub const FIRST_BUILD_MTIME: i64 = 2_000;

pub struct TestContext {
    pub root: ChildPath,
    pub site_packages: ChildPath,
    pub build_dir: ChildPath,
    _root: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create test root directory");
        let site_packages = ChildPath::new(root.path().join("site-packages"));
        site_packages.create_dir_all().unwrap();
        let build_dir = ChildPath::new(root.path().join("build"));
        Self {
            root: ChildPath::new(root.path()),
            site_packages,
            build_dir,
            _root: root,
        }
    }

    /// An interpreter whose search path is `entries` followed by the `site-packages`
    /// directory.
    pub fn interpreter(&self, entries: &[&Path]) -> Arc<Interpreter> {
        let mut search_path: Vec<PathBuf> = entries.iter().map(|entry| entry.to_path_buf()).collect();
        search_path.push(self.site_packages.to_path_buf());
        Arc::new(Interpreter::from_parts(
            self.root.path().join("venv/bin/python"),
            "3.12.4".to_string(),
            self.root.path().join("venv"),
            SearchPath::new(search_path, vec![self.site_packages.to_path_buf()]),
            vec![
                EXTENSION_SUFFIX.to_string(),
                ".abi3.so".to_string(),
                ".so".to_string(),
            ],
        ))
    }

    pub fn settings(&self) -> HookSettings {
        HookSettings {
            build_dir: self.build_dir.to_path_buf(),
            lock_timeout: Some(Duration::from_secs(30)),
            force_rebuild: false,
            install_new_packages: true,
            excluded_dir_names: mih_freshness::DEFAULT_EXCLUDED_DIR_NAMES
                .iter()
                .map(ToString::to_string)
                .collect::<FxHashSet<_>>(),
            show_warnings: true,
            enable_project_importer: true,
            enable_rs_file_importer: true,
            settings: BuildSettings::default(),
        }
    }

    /// Create a pure Rust project named `name`, with every file older than any build.
    pub fn pure_project(&self, name: &str) -> ChildPath {
        let project = self.root.child(name);
        write_at(
            &project.child("pyproject.toml"),
            &format!("[project]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
            SOURCE_MTIME,
        );
        write_at(
            &project.child("Cargo.toml"),
            &format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n\n[lib]\nname = \"{name}\"\n"),
            SOURCE_MTIME,
        );
        write_at(&project.child("src/lib.rs"), "// lib\n", SOURCE_MTIME);
        project
    }

    /// Record an editable install of `project` as `name` in `site-packages`, as `pip install -e`
    /// would.
    pub fn link_editable(&self, name: &str, project: &Path) {
        let direct_url = DirectUrl::editable_local(project).unwrap();
        self.site_packages
            .child(format!("{name}-0.1.0.dist-info/direct_url.json"))
            .write_str(&serde_json::to_string(&direct_url).unwrap())
            .unwrap();
    }
}

/// Write `contents` to `path` and set its modification time.
pub fn write_at(path: &ChildPath, contents: &str, seconds: i64) {
    path.write_str(contents).unwrap();
    set_mtime(path.path(), seconds);
}

pub fn set_mtime(path: &Path, seconds: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(seconds, 0)).unwrap();
}

/// Writes the files of a `maturin develop` build, given the manifest of the project and the
/// modification time to give every written file.
pub type Install = dyn Fn(&Path, i64) -> io::Result<()> + Send + Sync;

/// Stands in for `maturin`, counting builds.
pub struct FakeBackend {
    builds: AtomicUsize,
    args: Mutex<Vec<Vec<String>>>,
    clock: AtomicI64,
    delay: Duration,
    install: Box<Install>,
    omit_extension: bool,
}

impl FakeBackend {
    pub fn new(install: impl Fn(&Path, i64) -> io::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            args: Mutex::new(Vec::new()),
            clock: AtomicI64::new(FIRST_BUILD_MTIME),
            delay: Duration::ZERO,
            install: Box::new(install),
            omit_extension: false,
        }
    }

    /// A backend for single-file builds only.
    pub fn wheels() -> Self {
        Self::new(|_, _| Err(io::Error::other("`develop` is not expected")))
    }

    /// Make every build take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Build wheels that don't contain the extension module.
    #[must_use]
    pub fn omitting_extension(mut self) -> Self {
        self.omit_extension = true;
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<Vec<String>> {
        self.args.lock().unwrap().last().cloned()
    }

    /// Set the modification time given to files written by the next builds.
    pub fn set_clock(&self, seconds: i64) {
        self.clock.store(seconds, Ordering::SeqCst);
    }

    fn record(&self, settings: &BuildSettings) {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.args.lock().unwrap().push(settings.to_args());
        std::thread::sleep(self.delay);
    }
}

impl BuildBackend for FakeBackend {
    fn develop(&self, manifest_path: &Path, settings: &BuildSettings) -> Result<String, Error> {
        check_supported(settings, BuildCommand::Develop)?;
        self.record(settings);
        (self.install)(manifest_path, self.clock.load(Ordering::SeqCst))?;
        Ok("    Finished `dev` profile [unoptimized + debuginfo] target(s) in 0.01s\n".to_string())
    }

    fn build_wheel(
        &self,
        manifest_path: &Path,
        _interpreter: &Path,
        out_dir: &Path,
        settings: &BuildSettings,
    ) -> Result<String, Error> {
        check_supported(settings, BuildCommand::Build)?;
        self.record(settings);

        let module = manifest_path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .ok_or_else(|| io::Error::other("unexpected manifest path"))?;
        fs_err::create_dir_all(out_dir)?;
        let wheel = out_dir.join(format!("{module}-0.1.0-cp312-cp312-linux_x86_64.whl"));
        let mut writer = zip::ZipWriter::new(fs_err::File::create(wheel)?);
        writer.start_file(format!("{module}/__init__.py"), SimpleFileOptions::default())?;
        writer.write_all(format!("from .{module} import *\n").as_bytes())?;
        if !self.omit_extension {
            writer.start_file(
                format!("{module}/{module}{EXTENSION_SUFFIX}"),
                SimpleFileOptions::default(),
            )?;
            writer.write_all(b"\x7fELF")?;
        }
        writer.finish()?;
        Ok("warning: `my_script` (lib) generated 1 warning\n".to_string())
    }

    fn new_project(&self, project_dir: &Path) -> Result<String, Error> {
        let name = project_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("project");
        fs_err::create_dir_all(project_dir.join("src"))?;
        fs_err::write(
            project_dir.join("Cargo.toml"),
            format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )?;
        fs_err::write(project_dir.join("src/lib.rs"), "")?;
        Ok(String::new())
    }
}

/// Settings that can be changed between imports.
#[derive(Default)]
pub struct SwitchableSettings(Mutex<BuildSettings>);

impl SwitchableSettings {
    pub fn set(&self, settings: BuildSettings) {
        *self.0.lock().unwrap() = settings;
    }
}

impl mih_build::SettingsProvider for SwitchableSettings {
    fn get_settings(&self, _module_path: &str, _source_path: &Path) -> BuildSettings {
        self.0.lock().unwrap().clone()
    }
}

/// Install a pure project as `maturin develop` would: a package directory in `site-packages`
/// holding the extension module.
pub fn install_pure(
    site_packages: &Path,
    name: &'static str,
) -> impl Fn(&Path, i64) -> io::Result<()> + Send + Sync + 'static {
    let site_packages = site_packages.to_path_buf();
    move |_manifest_path: &Path, mtime: i64| {
        let package = site_packages.join(name);
        fs_err::create_dir_all(&package)?;
        for file in [
            package.join("__init__.py"),
            package.join(format!("{name}{EXTENSION_SUFFIX}")),
        ] {
            fs_err::write(&file, "")?;
            filetime::set_file_mtime(&file, FileTime::from_unix_time(mtime, 0))?;
        }
        Ok(())
    }
}
