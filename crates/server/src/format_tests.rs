// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use compass_core::test_support::{test_epoch, test_process};
use compass_core::{LogKind, ProcessId, ProcessStatus};

#[test]
fn empty_table_says_so() {
    assert_eq!(process_table(&[], test_epoch()), "No processes found.");
}

#[test]
fn table_shows_status_pid_and_uptime() {
    let mut process = test_process("abcdef123456", "api");
    process.status = ProcessStatus::Running;
    process.pid = Some(4242);
    process.port = 3000;
    process.started_at = Some(test_epoch());

    let now = test_epoch() + chrono::Duration::seconds(90);
    let table = process_table(std::slice::from_ref(&process), now);

    assert!(table.starts_with("| ID | Name | Type | Status | PID | Port | Uptime |"));
    assert!(table.contains("| abcdef12 |"), "id is shortened: {table}");
    assert!(table.contains("| api |"));
    assert!(table.contains("| running |"));
    assert!(table.contains("| 4242 |"));
    assert!(table.contains("| 3000 |"));
    assert!(table.contains("| 1m |"));
}

#[test]
fn table_uses_dashes_for_absent_fields() {
    let process = test_process("p-1", "idle");
    let table = process_table(&[process], test_epoch());
    assert!(table.contains("| - | - | - |"));
}

#[test]
fn detail_includes_command_and_exit_code() {
    let mut process = test_process("p-1", "worker");
    process.args = vec!["-c".to_string(), "exit 3".to_string()];
    process.status = ProcessStatus::Failed;
    process.exit_code = Some(3);

    let detail = process_detail(&process, test_epoch());
    assert!(detail.contains("## worker"));
    assert!(detail.contains("`/bin/true -c exit 3`"));
    assert!(detail.contains("- **Status**: failed"));
    assert!(detail.contains("- **Exit code**: 3"));
}

#[test]
fn detail_shows_restart_budget_when_enabled() {
    let mut process = test_process("p-1", "svc");
    process.restart_policy.enabled = true;
    process.restart_policy.retry_count = 1;
    process.restart_policy.max_retries = 3;

    let detail = process_detail(&process, test_epoch());
    assert!(detail.contains("- **Restarts**: 1/3"));
}

#[test]
fn log_lines_carry_kind_and_message() {
    let logs = vec![
        ProcessLog::line("l-1", ProcessId::new("p-1"), LogKind::Stdout, "hello", test_epoch()),
        ProcessLog::line("l-2", ProcessId::new("p-1"), LogKind::Stderr, "oops", test_epoch()),
    ];
    let rendered = log_lines(&logs);
    assert!(rendered.contains("[stdout] hello"));
    assert!(rendered.contains("[stderr] oops"));
}

#[test]
fn empty_logs_say_so() {
    assert_eq!(log_lines(&[]), "No logs.");
}
