use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_fs::prelude::*;

use mih_build::{BuildBackend, BuildGuard, BuildSettings};
use mih_cache::BuildCache;
use mih_hook::{Finder, ImportError, LoadedModules, ProjectFinder};
use mih_python::{ModuleKind, ModuleSpec};

use crate::common::{
    EXTENSION_SUFFIX, FakeBackend, SOURCE_MTIME, SwitchableSettings, TestContext, install_pure,
    write_at,
};

fn import(finder: &ProjectFinder, name: &str) -> Result<Option<ModuleSpec>, ImportError> {
    finder.find_spec(name, None, &LoadedModules::default())
}

/// A project finder for a pure project that is found from its own directory on the search path.
fn pure_setup(context: &TestContext) -> (ProjectFinder, Arc<FakeBackend>) {
    let project = context.pure_project("my_project");
    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let finder = ProjectFinder::new(
        &context.settings(),
        context.interpreter(&[project.path()]),
        backend.clone(),
    )
    .unwrap();
    (finder, backend)
}

#[test_log::test]
fn second_import_does_not_rebuild() {
    let context = TestContext::new();
    let (finder, backend) = pure_setup(&context);

    let first = import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
    assert_eq!(first.kind, ModuleKind::Package);
    assert_eq!(
        first.origin,
        Some(context.site_packages.path().join("my_project/__init__.py"))
    );

    let second = import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
    assert_eq!(first, second);

    let mut cache = BuildCache::new(context.build_dir.path(), None).unwrap();
    let cache = cache.lock().unwrap();
    let status = cache
        .get_build_status(&context.root.path().join("my_project"))
        .unwrap();
    assert!((status.build_mtime - 2000.0).abs() < 1e-6);
    assert!(status.build_args.is_empty());
}

#[test]
fn source_change_rebuilds_once() {
    let context = TestContext::new();
    let (finder, backend) = pure_setup(&context);
    import(&finder, "my_project").unwrap().unwrap();

    write_at(
        &context.root.child("my_project/src/lib.rs"),
        "// changed\n",
        2500,
    );
    backend.set_clock(3000);
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);

    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
}

#[test]
fn path_dependency_change_rebuilds() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    write_at(
        &project.child("Cargo.toml"),
        indoc::indoc! {r#"
            [package]
            name = "my_project"
            version = "0.1.0"

            [dependencies]
            helper = { path = "../helper" }
        "#},
        SOURCE_MTIME,
    );
    write_at(
        &context.root.child("helper/Cargo.toml"),
        "[package]\nname = \"helper\"\n",
        SOURCE_MTIME,
    );
    write_at(&context.root.child("helper/src/lib.rs"), "", SOURCE_MTIME);

    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let finder = ProjectFinder::new(
        &context.settings(),
        context.interpreter(&[project.path()]),
        backend.clone(),
    )
    .unwrap();

    import(&finder, "my_project").unwrap().unwrap();
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);

    write_at(&context.root.child("helper/src/lib.rs"), "// changed\n", 2500);
    backend.set_clock(3000);
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
}

#[test]
fn excluded_directories_do_not_rebuild() {
    let context = TestContext::new();
    let (finder, backend) = pure_setup(&context);
    import(&finder, "my_project").unwrap().unwrap();

    for excluded in [
        "my_project/target/debug/libmy_project.so",
        "my_project/__pycache__/cache.pyc",
        "my_project/.venv/pyvenv.cfg",
    ] {
        write_at(&context.root.child(excluded), "", 9000);
    }
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
}

#[test]
fn build_args_change_rebuilds() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let settings = Arc::new(SwitchableSettings::default());
    let finder = ProjectFinder::new(
        &context.settings(),
        context.interpreter(&[project.path()]),
        backend.clone(),
    )
    .unwrap()
    .with_settings_provider(settings.clone());

    import(&finder, "my_project").unwrap().unwrap();
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);

    settings.set(BuildSettings {
        release: true,
        ..BuildSettings::default()
    });
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
    assert_eq!(backend.last_args(), Some(vec!["--release".to_string()]));

    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
}

#[test]
fn force_rebuild_always_builds() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let mut settings = context.settings();
    settings.force_rebuild = true;
    let finder = ProjectFinder::new(
        &settings,
        context.interpreter(&[project.path()]),
        backend.clone(),
    )
    .unwrap();

    import(&finder, "my_project").unwrap().unwrap();
    import(&finder, "my_project").unwrap().unwrap();
    assert_eq!(backend.builds(), 2);
}

#[test_log::test]
fn concurrent_first_imports_build_once() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend = Arc::new(
        FakeBackend::new(install_pure(&context.site_packages, "my_project"))
            .with_delay(Duration::from_millis(300)),
    );
    let interpreter = context.interpreter(&[project.path()]);

    // Each finder has its own handle on the build cache lock, like separate processes.
    let finders: Vec<ProjectFinder> = (0..4)
        .map(|_| {
            ProjectFinder::new(&context.settings(), interpreter.clone(), backend.clone()).unwrap()
        })
        .collect();

    let specs: Vec<ModuleSpec> = std::thread::scope(|scope| {
        let handles: Vec<_> = finders
            .iter()
            .map(|finder| scope.spawn(move || import(finder, "my_project")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap().unwrap())
            .collect()
    });

    assert_eq!(backend.builds(), 1);
    assert!(specs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn mixed_project_linked_by_dist_info() {
    let context = TestContext::new();
    let project = context.root.child("my_mixed");
    write_at(
        &project.child("pyproject.toml"),
        indoc::indoc! {r#"
            [project]
            name = "my_mixed"

            [tool.maturin]
            python-source = "python"
            module-name = "my_mixed._native"
        "#},
        SOURCE_MTIME,
    );
    write_at(
        &project.child("Cargo.toml"),
        "[package]\nname = \"my_mixed\"\nversion = \"0.1.0\"\n",
        SOURCE_MTIME,
    );
    write_at(&project.child("src/lib.rs"), "", SOURCE_MTIME);
    write_at(
        &project.child("python/my_mixed/__init__.py"),
        "from ._native import *\n",
        SOURCE_MTIME,
    );
    context.link_editable("my_mixed", project.path());

    let install = {
        let project = project.to_path_buf();
        let site_packages = context.site_packages.to_path_buf();
        move |_manifest_path: &Path, mtime: i64| -> io::Result<()> {
            let extension = project.join(format!("python/my_mixed/_native{EXTENSION_SUFFIX}"));
            fs_err::write(&extension, "")?;
            filetime::set_file_mtime(&extension, filetime::FileTime::from_unix_time(mtime, 0))?;
            fs_err::write(
                site_packages.join("my_mixed.pth"),
                format!("{}\n", project.join("python").display()),
            )?;
            // `maturin develop` records the wrong origin.
            fs_err::write(
                site_packages.join("my_mixed-0.1.0.dist-info/direct_url.json"),
                r#"{"url": "file:///elsewhere", "dir_info": {"editable": false}}"#,
            )?;
            Ok(())
        }
    };
    let backend = Arc::new(FakeBackend::new(install));
    let finder =
        ProjectFinder::new(&context.settings(), context.interpreter(&[]), backend.clone())
            .unwrap();

    let spec = import(&finder, "my_mixed").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
    assert_eq!(spec.kind, ModuleKind::Package);
    assert_eq!(
        spec.origin,
        Some(project.path().join("python/my_mixed/__init__.py"))
    );

    let dist_info = context.site_packages.path().join("my_mixed-0.1.0.dist-info");
    let direct_url = mih_python::read_direct_url(&dist_info).unwrap();
    assert!(direct_url.is_editable());
    assert_eq!(direct_url.file_path(), Some(project.to_path_buf()));

    import(&finder, "my_mixed").unwrap().unwrap();
    assert_eq!(backend.builds(), 1);
}

#[test]
fn install_new_packages_disabled() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend = Arc::new(FakeBackend::new(install_pure(
        &context.site_packages,
        "my_project",
    )));
    let mut settings = context.settings();
    settings.install_new_packages = false;
    let finder = ProjectFinder::new(
        &settings,
        context.interpreter(&[project.path()]),
        backend.clone(),
    )
    .unwrap();

    assert_eq!(import(&finder, "my_project").unwrap(), None);
    assert_eq!(backend.builds(), 0);

    // Installed with `pip install -e` from now on.
    context
        .site_packages
        .child("my_project")
        .create_dir_all()
        .unwrap();
    context.link_editable("my_project", project.path());
    assert!(import(&finder, "my_project").unwrap().is_some());
    assert_eq!(backend.builds(), 1);
}

#[test]
fn declines_without_building() {
    let context = TestContext::new();
    let (finder, backend) = pure_setup(&context);

    let mut modules = LoadedModules::default();
    modules.insert(ModuleSpec::extension("my_project", "my_project.so".into()));
    assert_eq!(finder.find_spec("my_project", None, &modules).unwrap(), None);

    let path = [context.root.to_path_buf()];
    assert_eq!(
        finder
            .find_spec("my_project", Some(&path), &LoadedModules::default())
            .unwrap(),
        None
    );

    {
        let _guard = BuildGuard::enter();
        assert_eq!(import(&finder, "my_project").unwrap(), None);
    }

    assert_eq!(import(&finder, "other_package").unwrap(), None);
    assert_eq!(backend.builds(), 0);
}

#[test]
fn build_failure() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend: Arc<dyn BuildBackend> = Arc::new(FakeBackend::new(|_, _| {
        Err(io::Error::other("error: could not compile `my_project`"))
    }));
    let finder = ProjectFinder::new(
        &context.settings(),
        context.interpreter(&[project.path()]),
        backend,
    )
    .unwrap();

    let err = import(&finder, "my_project").unwrap_err();
    assert!(
        matches!(&err, ImportError::BuildFailed { module, .. } if module == "my_project"),
        "{err:?}"
    );

    let mut cache = BuildCache::new(context.build_dir.path(), None).unwrap();
    assert_eq!(
        cache
            .lock()
            .unwrap()
            .get_build_status(project.path()),
        None
    );
}

#[test]
fn missing_package_after_build() {
    let context = TestContext::new();
    let project = context.pure_project("my_project");
    let backend = Arc::new(FakeBackend::new(|_, _| Ok(())));
    let finder = ProjectFinder::new(
        &context.settings(),
        context.interpreter(&[project.path()]),
        backend,
    )
    .unwrap();

    let err = import(&finder, "my_project").unwrap_err();
    insta::assert_snapshot!(err, @"Cannot find package `my_project` after installation");
}
