//! Smoke tests for the dao binary
//!
//! None of these reach a database: they cover help output, config handling
//! and masking.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn dao(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dao").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("DAO_DATASOURCE")
        .env_remove("DAO_DIR")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_help() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bootstrap a MySQL database"))
        .stdout(predicate::str::contains("mask"));
}

#[test]
fn test_mask_password_only() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .arg("mask")
        .arg("root:secret@tcp(127.0.0.1:3306)/mydb")
        .assert()
        .success()
        .stdout(predicate::eq("root:****@tcp(127.0.0.1:3306)/mydb\n"));
}

#[test]
fn test_mask_passes_plain_text_through() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .arg("mask")
        .arg("no credentials here")
        .assert()
        .success()
        .stdout(predicate::eq("no credentials here\n"));
}

#[test]
fn test_config_path() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("configs"))
        .stdout(predicate::str::contains("dao.toml"));
}

#[test]
fn test_config_show_writes_defaults_and_masks() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("root:****@"))
        .stdout(predicate::str::contains("Zsba").not());

    let written = fs::read_to_string(tmp.path().join("configs/dao.toml")).unwrap();
    assert!(written.contains("Zsba@mysql2018*"));
}

#[test]
fn test_config_show_honours_env_override() {
    let tmp = TempDir::new().unwrap();
    dao(&tmp)
        .env("DAO_DATASOURCE", "app:hunter2@tcp(db:3306)/shop")
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("app:****@tcp(db:3306)/shop"));
}

#[test]
fn test_config_validate_rejects_zero_pool() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("configs")).unwrap();
    fs::write(tmp.path().join("configs/dao.toml"), "maxOpen = 0\n").unwrap();

    dao(&tmp)
        .arg("config")
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("maxOpen"));
}

#[test]
fn test_demo_rejects_unknown_driver() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("configs")).unwrap();
    fs::write(tmp.path().join("configs/dao.toml"), "type = \"oracle\"\n").unwrap();

    dao(&tmp)
        .arg("demo")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid db.type"))
        .stdout(predicate::str::contains("oracle"));
}
