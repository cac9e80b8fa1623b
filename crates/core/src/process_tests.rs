// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::Clock;
use crate::test_support::test_process;
use proptest::prelude::*;

#[yare::parameterized(
    pending  = { ProcessStatus::Pending,  true },
    stopped  = { ProcessStatus::Stopped,  true },
    failed   = { ProcessStatus::Failed,   true },
    crashed  = { ProcessStatus::Crashed,  true },
    starting = { ProcessStatus::Starting, false },
    running  = { ProcessStatus::Running,  false },
    stopping = { ProcessStatus::Stopping, false },
)]
fn can_start(status: ProcessStatus, expected: bool) {
    assert_eq!(status.can_start(), expected);
}

#[yare::parameterized(
    starting = { ProcessStatus::Starting, true },
    running  = { ProcessStatus::Running,  true },
    pending  = { ProcessStatus::Pending,  false },
    stopping = { ProcessStatus::Stopping, false },
    stopped  = { ProcessStatus::Stopped,  false },
    failed   = { ProcessStatus::Failed,   false },
    crashed  = { ProcessStatus::Crashed,  false },
)]
fn can_stop(status: ProcessStatus, expected: bool) {
    assert_eq!(status.can_stop(), expected);
}

#[test]
fn terminal_states_cannot_hold_a_port() {
    for status in [
        ProcessStatus::Stopped,
        ProcessStatus::Failed,
        ProcessStatus::Crashed,
    ] {
        assert!(status.is_terminal());
        assert!(!status.is_active());
    }
}

#[yare::parameterized(
    start          = { ProcessStatus::Pending,  ProcessStatus::Starting, true },
    spawn_ok       = { ProcessStatus::Starting, ProcessStatus::Running,  true },
    spawn_fail     = { ProcessStatus::Starting, ProcessStatus::Failed,   true },
    stop_running   = { ProcessStatus::Running,  ProcessStatus::Stopping, true },
    exit_zero      = { ProcessStatus::Running,  ProcessStatus::Stopped,  true },
    exit_nonzero   = { ProcessStatus::Running,  ProcessStatus::Failed,   true },
    killed         = { ProcessStatus::Running,  ProcessStatus::Crashed,  true },
    stop_completes = { ProcessStatus::Stopping, ProcessStatus::Stopped,  true },
    restart        = { ProcessStatus::Stopped,  ProcessStatus::Starting, true },
    after_crash    = { ProcessStatus::Crashed,  ProcessStatus::Starting, true },
    after_failure  = { ProcessStatus::Failed,   ProcessStatus::Starting, true },
    skip_starting  = { ProcessStatus::Pending,  ProcessStatus::Running,  false },
    resurrect      = { ProcessStatus::Stopped,  ProcessStatus::Running,  false },
    stop_pending   = { ProcessStatus::Pending,  ProcessStatus::Stopping, false },
    double_stop    = { ProcessStatus::Stopped,  ProcessStatus::Stopping, false },
)]
fn transition_legality(from: ProcessStatus, to: ProcessStatus, expected: bool) {
    assert_eq!(from.can_transition_to(to), expected);
}

fn any_status() -> impl Strategy<Value = ProcessStatus> {
    prop_oneof![
        Just(ProcessStatus::Pending),
        Just(ProcessStatus::Starting),
        Just(ProcessStatus::Running),
        Just(ProcessStatus::Stopping),
        Just(ProcessStatus::Stopped),
        Just(ProcessStatus::Failed),
        Just(ProcessStatus::Crashed),
    ]
}

proptest! {
    /// Every legal transition chain keeps command predicates coherent:
    /// a state never allows both start and stop at once.
    #[test]
    fn start_and_stop_are_mutually_exclusive(status in any_status()) {
        prop_assert!(!(status.can_start() && status.can_stop()));
    }

    /// A terminal state can only ever transition into Starting.
    #[test]
    fn terminal_states_only_restart(from in any_status(), to in any_status()) {
        if from.is_terminal() && from.can_transition_to(to) {
            prop_assert_eq!(to, ProcessStatus::Starting);
        }
    }
}

#[test]
fn status_serde_uses_snake_case() {
    let json = serde_json::to_string(&ProcessStatus::Running).unwrap();
    assert_eq!(json, "\"running\"");
    let back: ProcessStatus = serde_json::from_str("\"crashed\"").unwrap();
    assert_eq!(back, ProcessStatus::Crashed);
}

#[test]
fn process_type_serde_uses_kebab_case() {
    let json = serde_json::to_string(&ProcessType::WebServer).unwrap();
    assert_eq!(json, "\"web-server\"");
    let back: ProcessType = serde_json::from_str("\"build-tool\"").unwrap();
    assert_eq!(back, ProcessType::BuildTool);
}

#[test]
fn process_serde_roundtrip() {
    let mut process = test_process("p-1", "api");
    process.environment.insert("PORT".into(), "3000".into());
    process.port = 3000;

    let json = serde_json::to_string(&process).unwrap();
    assert!(json.contains("\"projectId\""));
    assert!(json.contains("\"type\":\"custom\""));

    let back: Process = serde_json::from_str(&json).unwrap();
    assert_eq!(back, process);
}

#[test]
fn restart_policy_defaults() {
    let policy = RestartPolicy::default();
    assert!(!policy.enabled);
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.retry_delay_ms, 1_000);
    assert!(!policy.can_retry());
}

#[test]
fn restart_policy_retry_cap() {
    let mut policy = RestartPolicy {
        enabled: true,
        max_retries: 2,
        ..RestartPolicy::default()
    };
    assert!(policy.can_retry());
    policy.retry_count = 1;
    assert!(policy.can_retry());
    policy.retry_count = 2;
    assert!(!policy.can_retry());
}

#[test]
fn uptime_requires_running() {
    let clock = crate::FakeClock::new();
    let mut process = test_process("p-1", "api");
    process.started_at = Some(clock.now());
    clock.advance(chrono::Duration::seconds(5));

    assert_eq!(process.uptime_ms(clock.now()), None);

    process.status = ProcessStatus::Running;
    assert_eq!(process.uptime_ms(clock.now()), Some(5_000));
}

#[test]
fn filter_matches_by_project_status_and_type() {
    let mut process = test_process("p-1", "api");
    process.status = ProcessStatus::Running;
    process.kind = ProcessType::ApiServer;

    assert!(ProcessFilter::default().matches(&process));

    let filter = ProcessFilter {
        project_id: Some(process.project_id.clone()),
        status: Some(ProcessStatus::Running),
        kind: Some(ProcessType::ApiServer),
    };
    assert!(filter.matches(&process));

    let wrong_status = ProcessFilter {
        status: Some(ProcessStatus::Stopped),
        ..ProcessFilter::default()
    };
    assert!(!wrong_status.matches(&process));

    let wrong_project = ProcessFilter {
        project_id: Some(ProjectId::new("other")),
        ..ProcessFilter::default()
    };
    assert!(!wrong_project.matches(&process));
}
