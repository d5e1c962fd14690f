use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn write_manifest(root: &Path, contents: &str) {
    fs::write(root.join("pantry.json"), contents).expect("write manifest");
}

#[test]
fn resolve_prints_chosen_versions() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{
            "name": "demo",
            "dependencies": { "left-pad": "^1.0.0" }
        }"#,
    );

    Command::cargo_bin("pantry")
        .unwrap()
        .current_dir(dir.path())
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("resolve")
        .assert()
        .success()
        .stdout(contains("left-pad -> ^1.0.0"));
}

#[test]
fn lockfile_write_then_validate_round_trips() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{
            "name": "demo",
            "dependencies": { "left-pad": "^1.0.0" }
        }"#,
    );
    let lockfile_path = dir.path().join(".freezer");

    Command::cargo_bin("pantry")
        .unwrap()
        .current_dir(dir.path())
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("lockfile")
        .arg("write")
        .arg("--path")
        .arg(&lockfile_path)
        .assert()
        .success();

    assert!(lockfile_path.is_file());

    Command::cargo_bin("pantry")
        .unwrap()
        .current_dir(dir.path())
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("lockfile")
        .arg("validate")
        .arg("--path")
        .arg(&lockfile_path)
        .assert()
        .success()
        .stdout(contains("missing from installation: left-pad"));
}

#[test]
fn cache_stats_on_empty_cache_reports_zero() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), r#"{ "name": "demo" }"#);

    Command::cargo_bin("pantry")
        .unwrap()
        .current_dir(dir.path())
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("cache")
        .arg("stats")
        .assert()
        .success()
        .stdout(contains("0 packages"));
}

#[test]
fn lifecycle_rejects_unknown_script_name() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{
            "name": "demo",
            "scripts": { "build": "echo hi" }
        }"#,
    );

    Command::cargo_bin("pantry")
        .unwrap()
        .current_dir(dir.path())
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("lifecycle")
        .arg("build")
        .arg("--package")
        .arg("demo")
        .assert()
        .failure()
        .stderr(contains("unknown lifecycle script"));
}
