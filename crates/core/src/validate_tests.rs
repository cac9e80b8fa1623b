// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::test_epoch;
use crate::SupervisorError;

fn spec(name: &str, command: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        command: command.to_string(),
        ..ProcessSpec::default()
    }
}

#[test]
fn builds_pending_process_with_defaults() {
    let process = build_process(spec("api", "node"), "p-1", test_epoch()).unwrap();
    assert_eq!(process.id.as_str(), "p-1");
    assert_eq!(process.status, ProcessStatus::Pending);
    assert_eq!(process.project_id.as_str(), "default");
    assert_eq!(process.kind, crate::ProcessType::Custom);
    assert_eq!(process.port, 0);
    assert_eq!(process.created_at, test_epoch());
    assert_eq!(process.updated_at, test_epoch());
    assert!(process.pid.is_none());
}

#[test]
fn rejects_empty_name() {
    let err = build_process(spec("  ", "node"), "p-1", test_epoch()).unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[test]
fn rejects_empty_command() {
    let err = build_process(spec("api", ""), "p-1", test_epoch()).unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[yare::parameterized(
    unset        = { None,        Ok(0) },
    zero         = { Some(0),     Ok(0) },
    min          = { Some(1),     Ok(1) },
    max          = { Some(65535), Ok(65535) },
    over_max     = { Some(65536), Err(()) },
    way_over_max = { Some(99999), Err(()) },
)]
fn port_bounds(input: Option<u32>, expected: Result<u16, ()>) {
    match expected {
        Ok(port) => assert_eq!(validate_port(input).unwrap(), port),
        Err(()) => assert!(matches!(
            validate_port(input),
            Err(SupervisorError::InvalidConfig(_))
        )),
    }
}

#[test]
fn rejects_missing_working_dir() {
    let mut s = spec("api", "node");
    s.working_dir = Some("/no/such/dir/compass-validate-test".into());
    let err = build_process(s, "p-1", test_epoch()).unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[test]
fn accepts_existing_working_dir() {
    let mut s = spec("api", "node");
    s.working_dir = Some(std::env::temp_dir());
    assert!(build_process(s, "p-1", test_epoch()).is_ok());
}

#[yare::parameterized(
    plain          = { "PATH",       true },
    underscore     = { "_PRIVATE",   true },
    mixed          = { "MyVar_2",    true },
    empty          = { "",           false },
    leading_digit  = { "1VAR",       false },
    hyphen         = { "MY-VAR",     false },
    space          = { "MY VAR",     false },
    equals         = { "A=B",        false },
)]
fn env_name_rules(name: &str, valid: bool) {
    let mut env = EnvMap::default();
    env.insert(name.to_string(), "v".to_string());
    assert_eq!(validate_env(&env).is_ok(), valid);
}

#[test]
fn rejects_oversized_env_value() {
    let mut env = EnvMap::default();
    env.insert("BIG".to_string(), "x".repeat(32 * 1024 + 1));
    assert!(matches!(
        validate_env(&env),
        Err(SupervisorError::InvalidConfig(_))
    ));
}

#[test]
fn accepts_sensitive_names_with_warning() {
    // Accepted; the warning only goes to the log
    let mut env = EnvMap::default();
    env.insert("DATABASE_PASSWORD".to_string(), "hunter2".to_string());
    env.insert("API_KEY".to_string(), "k".to_string());
    assert!(validate_env(&env).is_ok());
}

#[test]
fn template_applied_before_validation() {
    let mut s = spec("cache", "");
    s.template = Some("redis".to_string());
    let process = build_process(s, "p-1", test_epoch()).unwrap();
    assert_eq!(process.command, "redis-server");
    assert_eq!(process.kind, crate::ProcessType::Database);
    assert_eq!(process.port, 6379);
}

#[test]
fn unknown_template_is_invalid_config() {
    let mut s = spec("x", "");
    s.template = Some("rails-dev".to_string());
    let err = build_process(s, "p-1", test_epoch()).unwrap_err();
    match err {
        SupervisorError::InvalidConfig(msg) => {
            assert!(msg.contains("rails-dev"));
            assert!(msg.contains("available"));
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}
