// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::test_epoch;

#[test]
fn log_serde_uses_wire_field_names() {
    let log = ProcessLog::line(
        "l-1",
        ProcessId::new("p-1"),
        LogKind::Stdout,
        "hello",
        test_epoch(),
    );
    let json = serde_json::to_string(&log).unwrap();
    assert!(json.contains("\"processId\":\"p-1\""));
    assert!(json.contains("\"type\":\"stdout\""));
    // No level on plain output lines
    assert!(!json.contains("\"level\""));

    let back: ProcessLog = serde_json::from_str(&json).unwrap();
    assert_eq!(back, log);
}

#[test]
fn system_log_carries_level() {
    let log = ProcessLog::system(
        "l-2",
        ProcessId::new("p-1"),
        "process exited with code 0",
        LogLevel::Info,
        test_epoch(),
    );
    assert_eq!(log.kind, LogKind::System);
    assert_eq!(log.level, Some(LogLevel::Info));
}

#[yare::parameterized(
    stdout = { LogKind::Stdout, "stdout" },
    stderr = { LogKind::Stderr, "stderr" },
    system = { LogKind::System, "system" },
)]
fn log_kind_display(kind: LogKind, expected: &str) {
    assert_eq!(kind.to_string(), expected);
}
