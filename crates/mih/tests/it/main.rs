//! Tests for the `mih` command line that don't need a Python interpreter or `maturin`.

use assert_cmd::Command;
use assert_fs::prelude::*;
use indoc::indoc;
use predicates::prelude::*;

use mih_cache::{BuildCache, BuildStatus};

fn mih() -> Command {
    let mut command = Command::cargo_bin("mih").unwrap();
    command
        .env_remove("RUST_LOG")
        .env_remove("MATURIN_BUILD_DIR")
        .env_remove("MATURIN_IMPORT_HOOK_PYTHON");
    command
}

#[test]
fn project_show_mixed() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("pyproject.toml")
        .write_str(indoc! {r#"
            [project]
            name = "my-project"

            [tool.maturin]
            python-source = "python"
            module-name = "my_project._lib"
        "#})
        .unwrap();
    dir.child("Cargo.toml")
        .write_str(indoc! {r#"
            [package]
            name = "my-project"
            version = "0.1.0"

            [dependencies]
            helper = { path = "helper" }
        "#})
        .unwrap();
    dir.child("helper/Cargo.toml")
        .write_str("[package]\nname = \"helper\"\n")
        .unwrap();
    dir.child("python/my_project/__init__.py").touch().unwrap();

    mih()
        .arg("project")
        .arg("show")
        .arg(dir.child("python/my_project").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Module: my_project._lib"))
        .stdout(predicate::str::contains("Layout: mixed Rust/Python"))
        .stdout(predicate::str::contains("Path dependencies:\n"))
        .stdout(predicate::str::contains("helper"));
}

#[test]
fn project_show_without_project() {
    let dir = assert_fs::TempDir::new().unwrap();
    mih()
        .arg("project")
        .arg("show")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("No maturin project found"));
}

#[test]
fn cache_dir_override() {
    let dir = assert_fs::TempDir::new().unwrap();
    mih()
        .arg("cache")
        .arg("dir")
        .arg("--build-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            dir.path().file_name().unwrap().to_str().unwrap(),
        ));
}

#[test]
fn cache_status_and_clear() {
    let dir = assert_fs::TempDir::new().unwrap();
    let build_dir = dir.child("build");
    let project = dir.child("my_project");
    project.create_dir_all().unwrap();

    mih()
        .args(["cache", "clear", "--build-dir"])
        .arg(build_dir.path())
        .assert()
        .success()
        .stderr(predicate::str::starts_with("No build cache found at"));

    {
        let mut cache = BuildCache::new(build_dir.path(), None).unwrap();
        let cache = cache.lock().unwrap();
        cache
            .store_build_status(&BuildStatus {
                build_mtime: 1_700_000_000.0,
                source_path: project.to_path_buf(),
                build_args: vec!["--release".to_string()],
                build_output: indoc! {"
                    warning: `my_project` (lib) generated 1 warning
                        Finished `release` profile [optimized] target(s) in 1.00s
                "}
                .to_string(),
            })
            .unwrap();
    }

    mih()
        .args(["cache", "status", "--build-dir"])
        .arg(build_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("1 build statuses"));

    let output = mih()
        .args(["cache", "status", "--build-dir"])
        .arg(build_dir.path())
        .arg(project.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)
        .unwrap()
        .replace(&project.path().display().to_string(), "[PROJECT]");
    insta::assert_snapshot!(stdout, @r"
    Source: [PROJECT]
    Built: 2023-11-14T22:13:20Z
    Arguments: --release
    Output:     Finished `release` profile [optimized] target(s) in 1.00s
    The build produced warnings
    ");

    mih()
        .args(["cache", "clear", "--build-dir"])
        .arg(build_dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 1 build status"));

    mih()
        .args(["cache", "status", "--build-dir"])
        .arg(build_dir.path())
        .arg(project.path())
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("No build recorded for"));
}
