use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[rstest]
fn validation_failure_bubbles_to_cli() {
    let dir = tempdir().unwrap();
    let toml = r#"
[vertical]
tolerance = 0.0
"#;
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();

    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("vertical.tolerance"));
}

#[rstest]
fn malformed_toml_bubbles_to_cli() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[safety]\nmax_move_ms = \"fast\"\n").unwrap();

    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("parsing config"));
}

/// A missing config file is not an error; the built-in defaults apply.
#[rstest]
fn missing_config_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("does_not_exist.toml");

    let mut cmd = Command::cargo_bin("gantry").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("self-check ok"));
}
