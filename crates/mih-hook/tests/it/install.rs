use std::sync::Arc;

use assert_fs::prelude::*;

use mih_build::BuildBackend;
use mih_hook::{ImportError, MetaPath};
use mih_python::ModuleKind;

use crate::common::{FakeBackend, SOURCE_MTIME, TestContext, install_pure, write_at};

#[test]
fn install_and_uninstall() {
    let context = TestContext::new();
    let interpreter = context.interpreter(&[]);
    let backend: Arc<dyn BuildBackend> = Arc::new(FakeBackend::wheels());
    let mut meta_path = MetaPath::with_path_finder(interpreter.clone());
    assert_eq!(meta_path.len(), 1);

    let hooks = mih_hook::install(&mut meta_path, &context.settings(), &interpreter, &backend)
        .unwrap();
    assert!(hooks.has_project_finder());
    assert!(hooks.has_rust_file_finder());
    assert_eq!(meta_path.len(), 3);

    mih_hook::uninstall(&mut meta_path, hooks);
    assert_eq!(meta_path.len(), 1);

    let mut settings = context.settings();
    settings.enable_project_importer = false;
    let hooks = mih_hook::install(&mut meta_path, &settings, &interpreter, &backend).unwrap();
    assert!(!hooks.has_project_finder());
    assert!(hooks.has_rust_file_finder());
    assert_eq!(meta_path.len(), 2);
}

#[test]
fn project_finder_comes_before_rust_files() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    write_at(
        &context.root.child("scripts/my_project.rs"),
        "",
        SOURCE_MTIME,
    );
    let interpreter = context.interpreter(&[project.path(), context.root.child("scripts").path()]);
    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let dyn_backend: Arc<dyn BuildBackend> = backend.clone();
    let mut meta_path = MetaPath::with_path_finder(interpreter.clone());
    let _hooks =
        mih_hook::install(&mut meta_path, &context.settings(), &interpreter, &dyn_backend)
            .unwrap();

    let spec = meta_path.import("my_project").unwrap();
    assert_eq!(
        spec.origin,
        Some(context.site_packages.path().join("my_project/__init__.py"))
    );
    assert_eq!(backend.builds(), 1);
}

#[test]
fn import_rust_file_in_package() {
    let context = TestContext::new();
    context
        .root
        .child("scripts/pkg/__init__.py")
        .touch()
        .unwrap();
    write_at(
        &context.root.child("scripts/pkg/my_script.rs"),
        "",
        SOURCE_MTIME,
    );
    let interpreter = context.interpreter(&[context.root.child("scripts").path()]);
    let backend = Arc::new(FakeBackend::wheels());
    let dyn_backend: Arc<dyn BuildBackend> = backend.clone();
    let mut meta_path = MetaPath::with_path_finder(interpreter.clone());
    let _hooks =
        mih_hook::install(&mut meta_path, &context.settings(), &interpreter, &dyn_backend)
            .unwrap();

    let spec = meta_path.import("pkg.my_script").unwrap();
    assert_eq!(spec.kind, ModuleKind::Extension);
    assert_eq!(
        meta_path.modules().get("pkg").map(|spec| spec.kind),
        Some(ModuleKind::Package)
    );

    // Loaded modules are not looked up again.
    meta_path.import("pkg.my_script").unwrap();
    assert_eq!(backend.builds(), 1);
}

#[test]
fn missing_module() {
    let context = TestContext::new();
    let interpreter = context.interpreter(&[]);
    let backend: Arc<dyn BuildBackend> = Arc::new(FakeBackend::wheels());
    let mut meta_path = MetaPath::with_path_finder(interpreter.clone());
    let _hooks =
        mih_hook::install(&mut meta_path, &context.settings(), &interpreter, &backend).unwrap();

    let err = meta_path.import("missing.child").unwrap_err();
    assert!(matches!(&err, ImportError::ModuleNotFound(name) if name == "missing"));
    insta::assert_snapshot!(err, @"No module named `missing`");
}
