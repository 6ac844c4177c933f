// ABOUTME: Integration tests for the blogkeeper CLI binary.
// ABOUTME: Covers argument handling and the hard-failure exit path with suggestions.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn blogkeeper_cmd() -> Command {
    let mut cmd = Command::cargo_bin("blogkeeper").unwrap();
    cmd.env_remove("BLOGKEEPER_CONFIG");
    cmd
}

#[test]
fn help_lists_format_flags() {
    blogkeeper_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--pdf"))
        .stdout(predicate::str::contains("--md"))
        .stdout(predicate::str::contains("--mhtml"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn missing_url_fails() {
    blogkeeper_cmd().assert().failure();
}

#[test]
fn unsupported_domain_prints_suggestion() {
    let out = TempDir::new().unwrap();
    blogkeeper_cmd()
        .arg("https://unknown.example.com/post/1")
        .arg("-o")
        .arg(out.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unsupported platform"))
        .stderr(predicate::str::contains("unknown.example.com"))
        .stderr(predicate::str::contains("suggestion: This site is not supported"))
        .stderr(predicate::str::contains("CSDN"));

    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn malformed_url_fails() {
    let out = TempDir::new().unwrap();
    blogkeeper_cmd()
        .arg("not a url")
        .arg("-o")
        .arg(out.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid URL"));
}

#[test]
fn invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, "{ not json").unwrap();

    blogkeeper_cmd()
        .arg("https://blog.csdn.net/x/article/details/1")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid platform configuration"));
}

#[test]
fn config_can_come_from_environment() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, "[]").unwrap();

    Command::cargo_bin("blogkeeper")
        .unwrap()
        .env("BLOGKEEPER_CONFIG", &config)
        .arg("https://blog.csdn.net/x/article/details/1")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid platform configuration"));
}
