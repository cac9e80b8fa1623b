//! compassd argument handling.

use crate::prelude::*;

#[test]
fn version_flag_prints_version() {
    let output = compassd_cmd().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("compassd "), "got: {stdout}");
}

#[test]
fn help_flag_documents_usage() {
    let output = compassd_cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("USAGE:"));
    assert!(stdout.contains("compass.process.*"));
}

#[test]
fn unexpected_argument_fails() {
    let output = compassd_cmd().arg("--bogus").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("unexpected argument"));
}
