use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use predicates::prelude::*;

use mih_build::{BuildGuard, BuildSettings, CommandOptions};
use mih_cache::BuildCache;
use mih_hook::{Finder, ImportError, LoadedModules, RustFileFinder};
use mih_python::{ModuleKind, ModuleSpec};

use crate::common::{
    EXTENSION_SUFFIX, FakeBackend, SOURCE_MTIME, SwitchableSettings, TestContext, set_mtime,
    write_at,
};

const SCRIPT: &str = "use pyo3::prelude::*;\n";

fn script(context: &TestContext, name: &str) -> ChildPath {
    let script = context.root.child(format!("scripts/{name}"));
    write_at(&script, SCRIPT, SOURCE_MTIME);
    script
}

fn import(finder: &RustFileFinder, name: &str) -> Result<Option<ModuleSpec>, ImportError> {
    finder.find_spec(name, None, &LoadedModules::default())
}

fn an_hour_from_now() -> i64 {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap();
    i64::try_from(now.as_secs()).unwrap() + 3600
}

#[test_log::test]
fn builds_once_then_fresh() {
    let context = TestContext::new();
    script(&context, "my_script.rs");
    let backend = Arc::new(FakeBackend::wheels());
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[context.root.child("scripts").path()]),
        backend.clone(),
    )
    .unwrap();

    let first = import(&finder, "my_script").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
    assert_eq!(first.kind, ModuleKind::Extension);
    let origin = first.origin.clone().unwrap();
    assert!(origin.starts_with(context.build_dir.path()));
    assert!(origin.ends_with(format!("dist/my_script/my_script{EXTENSION_SUFFIX}")));
    assert!(origin.is_file());

    let second = import(&finder, "my_script").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
    assert_eq!(first, second);
}

#[test]
fn generated_project_holds_the_source() {
    let context = TestContext::new();
    let script = script(&context, "my_script.rs");
    let backend = Arc::new(FakeBackend::wheels());
    let mut settings = context.settings();
    settings.settings.features = Some(vec!["fast".to_string()]);
    let finder = RustFileFinder::new(
        &settings,
        context.interpreter(&[context.root.child("scripts").path()]),
        backend,
    )
    .unwrap();
    import(&finder, "my_script").unwrap().unwrap();

    let mut cache = BuildCache::new(context.build_dir.path(), None).unwrap();
    let cache = cache.lock().unwrap();
    let project = ChildPath::new(cache.scratch_dir(script.path(), "my_script").join("my_script"));
    project.child("src/lib.rs").assert(SCRIPT);
    project
        .child("Cargo.toml")
        .assert(predicate::str::ends_with("\n[features]\nfast = []"));

    let status = cache.get_build_status(script.path()).unwrap();
    assert_eq!(status.build_args, ["--features", "fast"]);
}

#[test]
fn source_change_rebuilds() {
    let context = TestContext::new();
    let script = script(&context, "my_script.rs");
    let backend = Arc::new(FakeBackend::wheels());
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[context.root.child("scripts").path()]),
        backend.clone(),
    )
    .unwrap();

    import(&finder, "my_script").unwrap().unwrap();
    set_mtime(script.path(), an_hour_from_now());
    import(&finder, "my_script").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
}

#[test]
fn build_args_change_rebuilds() {
    let context = TestContext::new();
    script(&context, "my_script.rs");
    let backend = Arc::new(FakeBackend::wheels());
    let settings = Arc::new(SwitchableSettings::default());
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[context.root.child("scripts").path()]),
        backend.clone(),
    )
    .unwrap()
    .with_settings_provider(settings.clone());

    import(&finder, "my_script").unwrap().unwrap();
    settings.set(BuildSettings {
        release: true,
        strip: true,
        ..BuildSettings::default()
    });
    import(&finder, "my_script").unwrap().unwrap();
    import(&finder, "my_script").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
    assert_eq!(
        backend.last_args(),
        Some(vec!["--release".to_string(), "--strip".to_string()])
    );
}

#[test]
fn submodule_is_found_in_parent_path() {
    let context = TestContext::new();
    let script = context.root.child("scripts/pkg/my_script.rs");
    write_at(&script, SCRIPT, SOURCE_MTIME);
    let backend = Arc::new(FakeBackend::wheels());
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[]),
        backend.clone(),
    )
    .unwrap();

    assert_eq!(import(&finder, "pkg.my_script").unwrap(), None);

    let path = [context.root.path().join("scripts/pkg")];
    let spec = finder
        .find_spec("pkg.my_script", Some(&path), &LoadedModules::default())
        .unwrap()
        .unwrap();
    assert_eq!(spec.name, "pkg.my_script");
    assert_eq!(backend.builds(), 1);
}

#[test]
fn declines_without_building() {
    let context = TestContext::new();
    script(&context, "my_script.rs");
    let backend = Arc::new(FakeBackend::wheels());
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[context.root.child("scripts").path()]),
        backend.clone(),
    )
    .unwrap();

    assert_eq!(import(&finder, "other_script").unwrap(), None);

    let mut modules = LoadedModules::default();
    modules.insert(ModuleSpec::extension("my_script", "my_script.so".into()));
    assert_eq!(finder.find_spec("my_script", None, &modules).unwrap(), None);

    {
        let _guard = BuildGuard::enter();
        assert_eq!(import(&finder, "my_script").unwrap(), None);
    }
    assert_eq!(backend.builds(), 0);
}

#[test]
fn missing_extension_after_build() {
    let context = TestContext::new();
    script(&context, "my_script.rs");
    let finder = RustFileFinder::new(
        &context.settings(),
        context.interpreter(&[context.root.child("scripts").path()]),
        Arc::new(FakeBackend::wheels().omitting_extension()),
    )
    .unwrap();

    let err = import(&finder, "my_script").unwrap_err();
    match err {
        ImportError::LoadAfterBuild { module, dir } => {
            assert_eq!(module, "my_script");
            assert!(dir.ends_with(Path::new("dist").join("my_script")));
        }
        err => panic!("expected a load error, got {err:?}"),
    }
}

#[test]
fn develop_only_settings_fail_the_build() {
    let context = TestContext::new();
    script(&context, "my_script.rs");
    let mut settings = context.settings();
    settings.settings.command = CommandOptions::Develop {
        extras: Vec::new(),
        skip_install: false,
        uv: true,
    };
    let finder = RustFileFinder::new(
        &settings,
        context.interpreter(&[context.root.child("scripts").path()]),
        Arc::new(FakeBackend::wheels()),
    )
    .unwrap();

    let err = import(&finder, "my_script").unwrap_err();
    assert!(
        matches!(
            &err,
            ImportError::BuildFailed {
                err: mih_build::Error::UnsupportedCommand(mih_build::BuildCommand::Build),
                ..
            }
        ),
        "{err:?}"
    );
}
